//! # Response Cache
//!
//! Fingerprint-keyed storage of completion responses with a single-flight
//! guarantee for concurrent misses.
//!
//! ## Overview
//!
//! - [`fingerprint`]: deterministic SHA-256 key over the semantic content of
//!   a request. Equal requests collide; any semantic difference (model,
//!   messages, parameters, tools, response format) produces a distinct key.
//! - [`ResponseCache`]: the pluggable backend interface.
//! - [`InMemoryCache`]: bounded LRU with TTL expiry.
//! - [`DistributedCache`]: local LRU tier in front of a shared keyed store.
//! - [`SingleFlight`]: keyed promise map coalescing concurrent misses so the
//!   upstream is called at most once per key per in-flight window.
//!
//! Streaming requests are never cached; the cache middleware enforces that
//! above this layer.

use crate::models::{ChatRequest, ChatResponse};
use dashmap::DashMap;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;

/// Deterministic cache key for a completion request.
///
/// Hashes a canonical JSON document of the semantic fields. Tools are
/// sorted by function name so declaration order does not split the key.
pub fn fingerprint(request: &ChatRequest) -> String {
    let mut tools = request.tools.clone().unwrap_or_default();
    tools.sort_by(|a, b| a.function.name.cmp(&b.function.name));

    let canonical = serde_json::json!({
        "model": request.model,
        "system": request.system,
        "messages": request.messages,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "top_p": request.top_p,
        "stop": request.stop,
        "tools": tools,
        "tool_choice": request.tool_choice,
        "response_format": request.response_format,
    });

    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&canonical).unwrap_or_default());
    format!("chat:{}", hex::encode(hasher.finalize()))
}

/// A cached response with its creation time and TTL.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub response: ChatResponse,
    pub created_at: SystemTime,
    pub ttl: Duration,
}

impl CachedResponse {
    pub fn new(response: ChatResponse, ttl: Duration) -> Self {
        Self {
            response,
            created_at: SystemTime::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed().unwrap_or(Duration::MAX) > self.ttl
    }
}

/// Pluggable cache backend.
///
/// `set` is best-effort; backends swallow their own storage failures.
#[async_trait::async_trait]
pub trait ResponseCache: Send + Sync {
    /// The stored response, or `None` on miss or expiry.
    async fn get(&self, key: &str) -> Option<CachedResponse>;

    /// Store a response.
    async fn set(&self, key: &str, response: CachedResponse);

    /// Drop a single entry.
    async fn invalidate(&self, key: &str);

    /// Drop everything.
    async fn clear(&self);

    /// Current entry count.
    async fn len(&self) -> usize;
}

/// Bounded in-memory cache with LRU eviction and TTL expiry.
pub struct InMemoryCache {
    entries: Mutex<LruCache<String, CachedResponse>>,
}

impl InMemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least one");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

#[async_trait::async_trait]
impl ResponseCache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(cached) if !cached.is_expired() => Some(cached.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, response: CachedResponse) {
        self.entries.lock().unwrap().put(key.to_string(), response);
    }

    async fn invalidate(&self, key: &str) {
        self.entries.lock().unwrap().pop(key);
    }

    async fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    async fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// Local LRU tier in front of a shared keyed store.
///
/// The shared tier is the reference keyed external-store implementation;
/// reads populate the local tier for repeat hits.
pub struct DistributedCache {
    local: InMemoryCache,
    shared: DashMap<String, CachedResponse>,
}

impl DistributedCache {
    pub fn new(local_capacity: usize) -> Self {
        Self {
            local: InMemoryCache::new(local_capacity),
            shared: DashMap::new(),
        }
    }
}

#[async_trait::async_trait]
impl ResponseCache for DistributedCache {
    async fn get(&self, key: &str) -> Option<CachedResponse> {
        if let Some(cached) = self.local.get(key).await {
            return Some(cached);
        }
        match self.shared.get(key) {
            Some(entry) if !entry.is_expired() => {
                let cached = entry.clone();
                drop(entry);
                self.local.set(key, cached.clone()).await;
                Some(cached)
            }
            Some(entry) => {
                drop(entry);
                self.shared.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, response: CachedResponse) {
        self.local.set(key, response.clone()).await;
        self.shared.insert(key.to_string(), response);
    }

    async fn invalidate(&self, key: &str) {
        self.local.invalidate(key).await;
        self.shared.remove(key);
    }

    async fn clear(&self) {
        self.local.clear().await;
        self.shared.clear();
    }

    async fn len(&self) -> usize {
        self.shared.len()
    }
}

/// Outcome of [`SingleFlight::begin`]: either this caller leads the flight
/// and must publish an outcome, or it shares one produced by the leader.
pub enum Flight<'a, T: Clone + Send + Sync> {
    Leader(FlightLeader<'a, T>),
    Shared(T),
}

/// Leadership handle for one in-flight key. Publishing the outcome wakes all
/// waiters; dropping without publishing lets a waiter take over.
pub struct FlightLeader<'a, T: Clone + Send + Sync> {
    owner: &'a SingleFlight<T>,
    key: String,
    tx: watch::Sender<Option<T>>,
    done: bool,
}

impl<T: Clone + Send + Sync> FlightLeader<'_, T> {
    /// Publish the outcome to every waiter and retire the key.
    pub fn complete(mut self, value: T) {
        let _ = self.tx.send(Some(value));
        self.finish();
    }

    fn finish(&mut self) {
        if !self.done {
            self.done = true;
            self.owner.inflight.lock().unwrap().remove(&self.key);
        }
    }
}

impl<T: Clone + Send + Sync> Drop for FlightLeader<'_, T> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Keyed promise map: concurrent callers for one key coalesce onto a single
/// leader, and every waiter receives the leader's outcome.
pub struct SingleFlight<T: Clone + Send + Sync> {
    inflight: Mutex<HashMap<String, watch::Receiver<Option<T>>>>,
}

impl<T: Clone + Send + Sync> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send + Sync> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `key`. The first caller becomes the leader and
    /// must call [`FlightLeader::complete`]; everyone else waits for the
    /// published outcome. A leader that vanishes without publishing hands
    /// leadership to one of the waiters.
    pub async fn begin(&self, key: &str) -> Flight<'_, T> {
        loop {
            let waiter = {
                let mut inflight = self.inflight.lock().unwrap();
                match inflight.get(key) {
                    Some(rx) => rx.clone(),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        inflight.insert(key.to_string(), rx);
                        return Flight::Leader(FlightLeader {
                            owner: self,
                            key: key.to_string(),
                            tx,
                            done: false,
                        });
                    }
                }
            };

            let mut rx = waiter;
            loop {
                let published = rx.borrow().clone();
                if let Some(value) = published {
                    return Flight::Shared(value);
                }
                if rx.changed().await.is_err() {
                    // Leader went away without publishing; contend again.
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Choice, Message, Tool, Function};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn request(model: &str, content: &str) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            messages: vec![Message::user(content)],
            ..Default::default()
        }
    }

    fn response(text: &str) -> ChatResponse {
        ChatResponse {
            id: "chatcmpl-1".to_string(),
            provider: "test".to_string(),
            model: "test-model".to_string(),
            created: 0,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(text),
                finish_reason: None,
            }],
            usage: None,
            latency_ms: 1,
            cost_usd: 0.0,
            cached: false,
            thinking: None,
            state: HashMap::new(),
        }
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = request("gpt-4o-mini", "Hello");
        let b = request("gpt-4o-mini", "Hello");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_separates_semantic_differences() {
        let base = request("gpt-4o-mini", "Hello");

        let mut other_model = base.clone();
        other_model.model = "gpt-4o".to_string();
        assert_ne!(fingerprint(&base), fingerprint(&other_model));

        let other_message = request("gpt-4o-mini", "Hello!");
        assert_ne!(fingerprint(&base), fingerprint(&other_message));

        let mut other_params = base.clone();
        other_params.temperature = Some(0.2);
        assert_ne!(fingerprint(&base), fingerprint(&other_params));

        let mut with_tools = base.clone();
        with_tools.tools = Some(vec![Tool {
            tool_type: "function".to_string(),
            function: Function {
                name: "lookup".to_string(),
                description: None,
                parameters: serde_json::json!({}),
            },
        }]);
        assert_ne!(fingerprint(&base), fingerprint(&with_tools));
    }

    #[test]
    fn test_fingerprint_ignores_gateway_internal_fields() {
        let mut a = request("gpt-4o-mini", "Hello");
        let mut b = request("gpt-4o-mini", "Hello");
        a.tenant_id = Some("acme".to_string());
        b.tenant_id = Some("globex".to_string());
        a.metadata.insert("trace".to_string(), "1".to_string());
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_tool_order_is_normalized() {
        let tool = |name: &str| Tool {
            tool_type: "function".to_string(),
            function: Function {
                name: name.to_string(),
                description: None,
                parameters: serde_json::json!({}),
            },
        };
        let mut a = request("gpt-4o-mini", "Hello");
        let mut b = request("gpt-4o-mini", "Hello");
        a.tools = Some(vec![tool("alpha"), tool("beta")]);
        b.tools = Some(vec![tool("beta"), tool("alpha")]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[tokio::test]
    async fn test_in_memory_cache_roundtrip_and_expiry() {
        let cache = InMemoryCache::new(10);
        cache
            .set("k", CachedResponse::new(response("hi"), Duration::from_secs(60)))
            .await;
        assert!(cache.get("k").await.is_some());

        cache
            .set("gone", CachedResponse::new(response("hi"), Duration::ZERO))
            .await;
        assert!(cache.get("gone").await.is_none());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_distributed_cache_promotes_to_local() {
        let cache = DistributedCache::new(4);
        cache
            .set("k", CachedResponse::new(response("hi"), Duration::from_secs(60)))
            .await;
        // Wipe the local tier only; the shared tier must still serve.
        cache.local.clear().await;
        assert!(cache.get("k").await.is_some());
        assert_eq!(cache.local.len().await, 1);
    }

    #[tokio::test]
    async fn test_single_flight_coalesces_concurrent_misses() {
        let flights: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flights = Arc::clone(&flights);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                match flights.begin("key").await {
                    Flight::Leader(leader) => {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        leader.complete(42);
                        42
                    }
                    Flight::Shared(value) => value,
                }
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_flight_recovers_from_abandoned_leader() {
        let flights: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());

        let leader = match flights.begin("key").await {
            Flight::Leader(leader) => leader,
            Flight::Shared(_) => panic!("first caller must lead"),
        };

        let waiter = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                match flights.begin("key").await {
                    Flight::Leader(leader) => {
                        leader.complete(7);
                        7
                    }
                    Flight::Shared(value) => value,
                }
            })
        };

        // Dropping without publishing hands leadership to the waiter.
        drop(leader);
        assert_eq!(waiter.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_single_flight_distinct_keys_run_independently() {
        let flights: SingleFlight<u32> = SingleFlight::new();
        let a = flights.begin("a").await;
        let b = flights.begin("b").await;
        assert!(matches!(a, Flight::Leader(_)));
        assert!(matches!(b, Flight::Leader(_)));
    }
}
