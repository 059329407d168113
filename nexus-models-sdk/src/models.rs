//! # Unified Model Types
//!
//! Core data structures shared by every provider adapter and by the gateway
//! pipeline. Requests and responses are provider-neutral; each adapter maps
//! these types onto its own wire protocol and back.
//!
//! ## Overview
//!
//! - **Chat completions**: [`ChatRequest`] / [`ChatResponse`] with messages,
//!   generation parameters, tool declarations, and response-format control
//! - **Streaming**: [`StreamChunk`] deltas with a canonical finish reason
//! - **Embeddings**: [`EmbeddingRequest`] / [`EmbeddingResponse`]
//! - **Catalog**: [`ModelInfo`] entries with context-window and pricing data
//!
//! Message content is a union: either a plain string or an ordered list of
//! typed parts, so multimodal payloads survive normalization. Finish reasons
//! are canonicalized to `stop`, `length`, `tool_calls`, `content_filter`;
//! anything else passes through verbatim as [`FinishReason::Other`].
//!
//! ```rust
//! use nexus_models_sdk::models::{ChatRequest, Message};
//!
//! let request = ChatRequest {
//!     model: "gpt-4o-mini".to_string(),
//!     messages: vec![
//!         Message::system("You are a helpful assistant."),
//!         Message::user("Hello!"),
//!     ],
//!     temperature: Some(0.7),
//!     max_tokens: Some(100),
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Chat completion request.
///
/// The gateway-only fields (`tenant_id`, `key_id`, `metadata`) are never
/// serialized, so they cannot leak to an upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    /// The model to use for completion. May be a virtual alias name.
    pub model: String,
    /// The conversation to generate a response for.
    pub messages: Vec<Message>,
    /// Optional system prompt, folded by each adapter into whichever field
    /// the upstream prefers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Controls randomness (0.0 to 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling parameter (0.0 to 1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Sequences that stop generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Whether to stream the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Tools available for the model to use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    /// How the model should use tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Response format directive (text, JSON object, JSON schema).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    /// Extended-thinking configuration for providers that support it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    /// Owning tenant. Gateway-internal, never forwarded upstream.
    #[serde(skip_serializing, default)]
    pub tenant_id: Option<String>,
    /// API key that authorized the request. Gateway-internal.
    #[serde(skip_serializing, default)]
    pub key_id: Option<String>,
    /// Free-form request metadata. Gateway-internal.
    #[serde(skip_serializing, default)]
    pub metadata: HashMap<String, String>,
}

impl ChatRequest {
    /// Rough token estimate for quota and context-window checks, using the
    /// common four-characters-per-token heuristic.
    pub fn estimated_tokens(&self) -> u32 {
        let mut chars = self.system.as_deref().map_or(0, str::len);
        for message in &self.messages {
            chars += message.content.text_len();
        }
        (chars as u32 / 4).max(1)
    }
}

/// Chat completion response in the unified shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Stable identifier for the completion.
    pub id: String,
    /// Name of the provider that produced the response.
    pub provider: String,
    /// Model that actually served the request.
    pub model: String,
    /// Unix timestamp of creation.
    pub created: u64,
    /// Generated completions.
    pub choices: Vec<Choice>,
    /// Aggregate token usage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Measured upstream latency in milliseconds.
    pub latency_ms: u64,
    /// Monetary cost of the request in USD.
    pub cost_usd: f64,
    /// Whether this response was served from cache.
    pub cached: bool,
    /// Extended-thinking text, when the provider emitted any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Sparse state map populated by the pipeline (for example response
    /// headers recorded by the headers middleware).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub state: HashMap<String, serde_json::Value>,
}

impl ChatResponse {
    /// Convenience accessor for the first choice's text content.
    pub fn text(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.message.content.as_text())
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender.
    pub role: Role,
    /// Content of the message, plain text or multimodal parts.
    pub content: MessageContent,
    /// Optional name for the message sender.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls made by the assistant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call being responded to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    /// Create a tool-result message responding to `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::text(Role::Tool, content)
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Message content union: a plain string or an ordered list of typed parts.
///
/// Serialized untagged so the OpenAI wire shape (`"content": "hi"` or
/// `"content": [{"type": "text", ...}]`) round-trips unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content.
    Text(String),
    /// Multimodal part list.
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// The text if this content is plain text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Parts(_) => None,
        }
    }

    /// Total character count across all textual content.
    pub fn text_len(&self) -> usize {
        match self {
            MessageContent::Text(text) => text.len(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.len(),
                    ContentPart::ImageUrl { .. } => 0,
                })
                .sum(),
        }
    }

    /// Flatten to a single string, joining textual parts with newlines.
    pub fn flattened(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Text(value.to_string())
    }
}

/// One typed element of a multimodal message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// A text fragment.
    Text { text: String },
    /// An image reference.
    ImageUrl { image_url: ImageUrl },
}

/// Image reference inside a multimodal part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions and context.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// Tool function results.
    Tool,
}

/// Canonical cause of completion end.
///
/// Adapters map their own vocabulary onto the canonical set; unknown values
/// pass through as [`FinishReason::Other`] so callers can still see them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    /// The canonical wire string for this reason.
    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::Other(raw) => raw,
        }
    }
}

impl From<String> for FinishReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "stop" | "end_turn" | "stop_sequence" | "COMPLETE" => FinishReason::Stop,
            "length" | "max_tokens" | "MAX_TOKENS" => FinishReason::Length,
            "tool_calls" | "tool_use" | "function_call" => FinishReason::ToolCalls,
            "content_filter" | "safety" | "SAFETY" => FinishReason::ContentFilter,
            _ => FinishReason::Other(value),
        }
    }
}

impl From<FinishReason> for String {
    fn from(value: FinishReason) -> Self {
        value.as_str().to_string()
    }
}

/// A generated completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Index of the choice in the response.
    pub index: u32,
    /// The generated assistant message.
    pub message: Message,
    /// Reason why generation stopped.
    pub finish_reason: Option<FinishReason>,
}

/// Aggregate token usage for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Tool declaration offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: Function,
}

/// Function signature inside a tool declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

/// Tool-choice directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    /// `"none"`, `"auto"`, or `"required"`.
    Mode(String),
    /// Force a specific function.
    Specific {
        #[serde(rename = "type")]
        choice_type: String,
        function: FunctionChoice,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionChoice {
    pub name: String,
}

/// A tool invocation emitted by the model, canonicalized to
/// `(id, "function", {name, arguments})` regardless of upstream encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCall {
    /// Build a canonical function call. `arguments` must already be a JSON
    /// string, matching the OpenAI encoding every adapter converges on.
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments encoded as a JSON string.
    pub arguments: String,
}

/// Response format directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<serde_json::Value>,
}

/// Extended-thinking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
}

/// One streamed fragment of a completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub delta: Delta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Incremental content carried by a stream chunk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Partial tool call inside a stream delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCallDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Embedding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: EmbeddingInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    /// Owning tenant. Gateway-internal, never forwarded upstream.
    #[serde(skip_serializing, default)]
    pub tenant_id: Option<String>,
    /// API key that authorized the request. Gateway-internal.
    #[serde(skip_serializing, default)]
    pub key_id: Option<String>,
}

/// Embedding input: a single string or an array of strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    String(String),
    StringArray(Vec<String>),
}

/// Embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub provider: String,
    pub model: String,
    pub data: Vec<Embedding>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub index: u32,
    pub embedding: Vec<f32>,
}

/// Catalog entry describing one model a provider can serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier as accepted in requests.
    pub id: String,
    /// Owning provider name.
    pub provider: String,
    /// Context window in tokens, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    /// Input price per 1000 tokens in USD.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_cost_per_1k: Option<f64>,
    /// Output price per 1000 tokens in USD.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cost_per_1k: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let user_msg = Message::user("Hello, world!");
        assert_eq!(user_msg.role, Role::User);
        assert_eq!(user_msg.content.as_text(), Some("Hello, world!"));

        let tool_msg = Message::tool("call_1", "42");
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_finish_reason_canonicalization() {
        assert_eq!(FinishReason::from("end_turn".to_string()), FinishReason::Stop);
        assert_eq!(FinishReason::from("max_tokens".to_string()), FinishReason::Length);
        assert_eq!(FinishReason::from("tool_use".to_string()), FinishReason::ToolCalls);
        assert_eq!(
            FinishReason::from("recitation".to_string()),
            FinishReason::Other("recitation".to_string())
        );
        assert_eq!(
            FinishReason::Other("recitation".to_string()).as_str(),
            "recitation"
        );
    }

    #[test]
    fn test_content_union_serde() {
        let text: MessageContent = serde_json::from_str("\"hi\"").unwrap();
        assert_eq!(text.as_text(), Some("hi"));

        let parts: MessageContent = serde_json::from_str(
            r#"[{"type":"text","text":"look"},{"type":"image_url","image_url":{"url":"https://x/y.png"}}]"#,
        )
        .unwrap();
        assert_eq!(parts.text_len(), 4);
        assert_eq!(parts.flattened(), "look");
    }

    #[test]
    fn test_internal_fields_never_serialized() {
        let mut request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![Message::user("hi")],
            tenant_id: Some("tenant-1".to_string()),
            key_id: Some("key-1".to_string()),
            ..Default::default()
        };
        request.metadata.insert("trace".to_string(), "abc".to_string());

        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("tenant-1"));
        assert!(!json.contains("key-1"));
        assert!(!json.contains("trace"));
    }

    #[test]
    fn test_tool_call_canonical_form() {
        let call = ToolCall::function("call_9", "get_weather", r#"{"city":"Oslo"}"#);
        assert_eq!(call.call_type, "function");
        assert_eq!(call.function.name, "get_weather");
    }

    #[test]
    fn test_estimated_tokens_floor() {
        let request = ChatRequest {
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        assert_eq!(request.estimated_tokens(), 1);
    }
}
