//! Shared HTTP transport for provider adapters.
//!
//! Wraps a configured `reqwest` client with the auth and header plumbing
//! every adapter needs, plus an SSE entry point that hands the response body
//! to [`SseStream`] with an adapter-supplied payload decoder.

use crate::error::ProviderError;
use crate::streaming::{BoxCompletionStream, EventDecoder, SseStream};
use futures::StreamExt;
use reqwest::{header::HeaderMap, Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// How the transport authenticates against the upstream.
#[derive(Clone, Debug)]
pub enum AuthStrategy {
    Bearer { token: String },
    Header { name: String, value: String },
    None,
}

/// Pre-configured HTTP client shared by provider adapters.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    base_url: String,
    default_headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(
        timeout: Duration,
        base_url: Option<String>,
        default_base: &str,
        headers: &HashMap<String, String>,
        auth: AuthStrategy,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder().timeout(timeout).build().map_err(|e| {
            ProviderError::Configuration {
                message: format!("Failed to create HTTP client: {e}"),
            }
        })?;

        let mut default_headers = HeaderMap::new();

        match auth {
            AuthStrategy::Bearer { token } => {
                if let Ok(value) = format!("Bearer {token}").parse() {
                    default_headers.insert("Authorization", value);
                }
            }
            AuthStrategy::Header { name, value } => {
                if let (Ok(name), Ok(value)) =
                    (name.parse::<reqwest::header::HeaderName>(), value.parse())
                {
                    default_headers.insert(name, value);
                }
            }
            AuthStrategy::None => {}
        }

        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (k.parse::<reqwest::header::HeaderName>(), v.parse()) {
                default_headers.insert(name, value);
            }
        }

        let base_url = base_url.unwrap_or_else(|| default_base.to_string());

        Ok(Self {
            http,
            base_url,
            default_headers,
        })
    }

    fn build_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url.trim_end_matches('/'), path)
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path)
        }
    }

    /// POST a JSON body and decode a JSON response.
    pub async fn post_json<TReq: Serialize, TResp: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TResp, ProviderError> {
        let resp = self
            .http
            .request(Method::POST, self.build_url(path))
            .headers(self.default_headers.clone())
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(resp.json::<TResp>().await?)
    }

    /// POST a JSON body and consume the response as a chunk stream, decoding
    /// each SSE data payload with `decode`.
    pub async fn post_sse<TReq: Serialize>(
        &self,
        path: &str,
        body: &TReq,
        decode: EventDecoder,
    ) -> Result<BoxCompletionStream, ProviderError> {
        let resp = self
            .http
            .request(Method::POST, self.build_url(path))
            .headers(self.default_headers.clone())
            .header("Accept", "text/event-stream")
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(Box::new(SseStream::new(resp.bytes_stream().boxed(), decode)))
    }

    /// GET a path and decode a JSON response. Used for model catalogs.
    pub async fn get_json<TResp: DeserializeOwned>(&self, path: &str) -> Result<TResp, ProviderError> {
        let resp = self
            .http
            .request(Method::GET, self.build_url(path))
            .headers(self.default_headers.clone())
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(resp.json::<TResp>().await?)
    }

    /// Probe connectivity. Reachable-but-rejected counts as up; only
    /// connect-level failures count as down.
    pub async fn probe(&self, path: &str) -> bool {
        match self
            .http
            .request(Method::GET, self.build_url(path))
            .headers(self.default_headers.clone())
            .send()
            .await
        {
            Ok(_) => true,
            Err(err) => !err.is_connect() && !err.is_timeout(),
        }
    }
}

async fn map_error_response(resp: Response) -> ProviderError {
    let code = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    match code {
        401 | 403 => ProviderError::Authentication { message },
        429 => ProviderError::RateLimit,
        500..=599 => ProviderError::ServiceUnavailable,
        _ => ProviderError::Api { code, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Delta, StreamChunk};
    use crate::streaming::{CompletionStream, StreamEvent};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_post_json_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/echo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(
            Duration::from_secs(5),
            Some(server.uri()),
            "https://unused.example",
            &HashMap::new(),
            AuthStrategy::Bearer { token: "sk-test".to_string() },
        )
        .unwrap();

        let resp: serde_json::Value = transport
            .post_json("/v1/echo", &serde_json::json!({"ping": 1}))
            .await
            .unwrap();
        assert_eq!(resp["ok"], true);
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/echo"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(
            Duration::from_secs(5),
            Some(server.uri()),
            "https://unused.example",
            &HashMap::new(),
            AuthStrategy::None,
        )
        .unwrap();

        let err = transport
            .post_json::<_, serde_json::Value>("/v1/echo", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_post_sse_decodes_chunks() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"content\":\"Hel\"}\n\n",
            ": comment line\n",
            "data: {\"content\":\"lo\"}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(
            Duration::from_secs(5),
            Some(server.uri()),
            "https://unused.example",
            &HashMap::new(),
            AuthStrategy::None,
        )
        .unwrap();

        let decode: EventDecoder = Box::new(|payload| {
            let value: serde_json::Value = serde_json::from_str(payload)?;
            Ok(vec![StreamEvent::Chunk(StreamChunk {
                id: "s-1".to_string(),
                provider: "test".to_string(),
                model: "test-model".to_string(),
                delta: Delta {
                    content: value["content"].as_str().map(String::from),
                    ..Default::default()
                },
                finish_reason: None,
            })])
        });

        let mut stream = transport
            .post_sse("/v1/stream", &serde_json::json!({}), decode)
            .await
            .unwrap();

        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(chunk.unwrap().delta.content.as_deref().unwrap_or(""));
        }
        assert_eq!(text, "Hello");
    }
}
