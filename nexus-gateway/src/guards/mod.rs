//! # Content Guards
//!
//! Phase-keyed content inspection. Input guards run before any upstream
//! work, output guards run over the produced response on the way out, and
//! stream guards (see [`stream`]) inspect chunks as they flow.
//!
//! A guard either passes, blocks with a reason (terminal for the request),
//! or rewrites the message list in full, which is how redaction works.

use async_trait::async_trait;
use nexus_models_sdk::models::{Message, MessageContent};
use regex::Regex;
use std::sync::Arc;

use crate::gateway_error::GatewayError;

pub mod stream;

pub use stream::{GuardedStream, KeywordStreamGuard, StreamAction, StreamGuard, StreamScanMode};

/// Which side of the provider call a guard inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    Input,
    Output,
}

/// Outcome of one guard check.
#[derive(Debug, Clone, Default)]
pub struct CheckResult {
    pub blocked: bool,
    pub reason: Option<String>,
    pub modified: bool,
    pub messages: Option<Vec<Message>>,
}

impl CheckResult {
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Full message-list replacement.
    pub fn replace(messages: Vec<Message>) -> Self {
        Self {
            modified: true,
            messages: Some(messages),
            ..Default::default()
        }
    }
}

/// A content inspector for one or both phases.
#[async_trait]
pub trait Guard: Send + Sync {
    fn name(&self) -> &str;

    fn applies_to(&self, phase: GuardPhase) -> bool;

    async fn check(
        &self,
        phase: GuardPhase,
        messages: &[Message],
    ) -> Result<CheckResult, GatewayError>;
}

/// Ordered set of guards. Blocking is terminal; modifications chain, each
/// guard seeing the previous guard's rewrite.
#[derive(Default, Clone)]
pub struct GuardRegistry {
    guards: Vec<Arc<dyn Guard>>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, guard: Arc<dyn Guard>) {
        self.guards.push(guard);
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Run every guard registered for `phase`. Returns the rewritten
    /// message list when any guard modified it.
    pub async fn run(
        &self,
        phase: GuardPhase,
        messages: &[Message],
    ) -> Result<Option<Vec<Message>>, GatewayError> {
        let mut current: Option<Vec<Message>> = None;
        for guard in self.guards.iter().filter(|g| g.applies_to(phase)) {
            let view = current.as_deref().unwrap_or(messages);
            let result = guard.check(phase, view).await?;
            if result.blocked {
                let reason = result
                    .reason
                    .unwrap_or_else(|| format!("blocked by guard {}", guard.name()));
                return Err(GatewayError::ContentBlocked { reason });
            }
            if result.modified {
                if let Some(replacement) = result.messages {
                    current = Some(replacement);
                }
            }
        }
        Ok(current)
    }
}

fn message_text(message: &Message) -> String {
    message.content.flattened()
}

/// Blocks any message containing one of the configured literals.
pub struct KeywordGuard {
    name: String,
    phases: Vec<GuardPhase>,
    keywords: Vec<String>,
}

impl KeywordGuard {
    pub fn new(name: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            name: name.into(),
            phases: vec![GuardPhase::Input],
            keywords,
        }
    }

    pub fn for_phases(mut self, phases: Vec<GuardPhase>) -> Self {
        self.phases = phases;
        self
    }
}

#[async_trait]
impl Guard for KeywordGuard {
    fn name(&self) -> &str {
        &self.name
    }

    fn applies_to(&self, phase: GuardPhase) -> bool {
        self.phases.contains(&phase)
    }

    async fn check(
        &self,
        _phase: GuardPhase,
        messages: &[Message],
    ) -> Result<CheckResult, GatewayError> {
        for message in messages {
            let text = message_text(message);
            for keyword in &self.keywords {
                if text.contains(keyword.as_str()) {
                    return Ok(CheckResult::block(format!(
                        "message contains forbidden content: {keyword}"
                    )));
                }
            }
        }
        Ok(CheckResult::pass())
    }
}

/// Redacts pattern matches instead of blocking. The stock patterns cover
/// email addresses and US social security numbers.
pub struct PiiRedactionGuard {
    name: String,
    patterns: Vec<Regex>,
    replacement: String,
}

impl PiiRedactionGuard {
    pub fn new(name: impl Into<String>, patterns: Vec<Regex>) -> Self {
        Self {
            name: name.into(),
            patterns,
            replacement: "[REDACTED]".to_string(),
        }
    }

    pub fn stock(name: impl Into<String>) -> Self {
        let patterns = vec![
            Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern"),
            Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn pattern"),
        ];
        Self::new(name, patterns)
    }
}

#[async_trait]
impl Guard for PiiRedactionGuard {
    fn name(&self) -> &str {
        &self.name
    }

    fn applies_to(&self, phase: GuardPhase) -> bool {
        phase == GuardPhase::Input
    }

    async fn check(
        &self,
        _phase: GuardPhase,
        messages: &[Message],
    ) -> Result<CheckResult, GatewayError> {
        let mut touched = false;
        let mut rewritten = messages.to_vec();
        for message in &mut rewritten {
            let text = message_text(message);
            let mut redacted = text.clone();
            for pattern in &self.patterns {
                redacted = pattern
                    .replace_all(&redacted, self.replacement.as_str())
                    .into_owned();
            }
            if redacted != text {
                message.content = MessageContent::Text(redacted);
                touched = true;
            }
        }
        if touched {
            Ok(CheckResult::replace(rewritten))
        } else {
            Ok(CheckResult::pass())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyword_guard_blocks() {
        let mut registry = GuardRegistry::new();
        registry.register(Arc::new(KeywordGuard::new(
            "blocklist",
            vec!["SSN:".to_string()],
        )));

        let messages = vec![Message::user("my SSN: 123")];
        let err = registry.run(GuardPhase::Input, &messages).await.unwrap_err();
        match err {
            GatewayError::ContentBlocked { reason } => {
                assert!(reason.contains("SSN:"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_keyword_guard_passes_clean_input() {
        let mut registry = GuardRegistry::new();
        registry.register(Arc::new(KeywordGuard::new(
            "blocklist",
            vec!["SSN:".to_string()],
        )));

        let messages = vec![Message::user("hello there")];
        assert!(registry
            .run(GuardPhase::Input, &messages)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_pii_guard_redacts() {
        let mut registry = GuardRegistry::new();
        registry.register(Arc::new(PiiRedactionGuard::stock("pii")));

        let messages = vec![Message::user("reach me at jane@example.com or 123-45-6789")];
        let rewritten = registry
            .run(GuardPhase::Input, &messages)
            .await
            .unwrap()
            .expect("messages should be rewritten");
        let text = rewritten[0].content.flattened();
        assert!(!text.contains("jane@example.com"));
        assert!(!text.contains("123-45-6789"));
        assert_eq!(text.matches("[REDACTED]").count(), 2);
    }

    #[tokio::test]
    async fn test_guards_chain_modifications() {
        let mut registry = GuardRegistry::new();
        registry.register(Arc::new(PiiRedactionGuard::stock("pii")));
        // The blocklist must see the redacted text, not the original.
        registry.register(Arc::new(KeywordGuard::new(
            "blocklist",
            vec!["jane@example.com".to_string()],
        )));

        let messages = vec![Message::user("reach me at jane@example.com")];
        let rewritten = registry.run(GuardPhase::Input, &messages).await.unwrap();
        assert!(rewritten.is_some());
    }

    #[tokio::test]
    async fn test_output_phase_filtering() {
        let mut registry = GuardRegistry::new();
        registry.register(Arc::new(
            KeywordGuard::new("out", vec!["secret".to_string()])
                .for_phases(vec![GuardPhase::Output]),
        ));

        let messages = vec![Message::user("secret")];
        // Input phase ignores an output-only guard.
        assert!(registry.run(GuardPhase::Input, &messages).await.is_ok());
        assert!(registry.run(GuardPhase::Output, &messages).await.is_err());
    }
}
