use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open-ended bag for vendor-specific passthrough fields and for the wire
/// bodies the adapters assemble. A `BTreeMap` rather than `serde_json::Map`
/// so key order is deterministic for tests, mirroring
/// `dispatch_protocol::openai::JsonObject`.
pub type JsonObject = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A source for non-text media content, unifying the `base64`/`url`/`file_id`
/// variants document/audio/video parts can carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSource {
    Base64 { data: String, mime: Option<String> },
    Url { url: String },
    FileId { file_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheControl {
    pub ephemeral: bool,
}

/// One typed content part of a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    Image {
        data: String,
        mime: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    Document {
        source: MediaSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    Audio {
        source: MediaSource,
    },
    Video {
        source: MediaSource,
    },
}

/// Message content is either a plain string or an ordered list of typed
/// parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Normalized tool-choice policy (`parseToolChoice`'s output shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Function { name: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThinkingControl {
    pub enabled: bool,
    pub budget_tokens: Option<u32>,
    pub effort_level: Option<String>,
    pub include_thoughts: bool,
}

/// Generation parameters the caller explicitly supplied. Every field is
/// `Option` so `extract_common_parameters` can omit anything unset rather
/// than emitting it as an explicit null.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub max_tokens: Option<u32>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub seed: Option<i64>,
    pub stop: Vec<String>,
}

/// The provider-agnostic request the Dispatcher hands to an adapter.
/// Streaming callbacks, the abort signal and the timeout are deliberately
/// not modeled here: those are execution-layer concerns (an async sink
/// trait + `CancellationToken` + deadline) that belong to the dispatch
/// context the core crate builds around one of these. Keeping the pure
/// translation model free of async plumbing keeps this crate leaf-level
/// and synchronous, with no dependency on `tokio` at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRequest {
    pub model_id: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub params: GenerationParams,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    #[serde(default)]
    pub parallel_tool_calls: Option<bool>,
    #[serde(default)]
    pub thinking: ThinkingControl,
    /// Vendor-specific passthrough fields, already filtered to exclude the
    /// reserved set by whatever layer constructed this request.
    #[serde(default)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, matching the wire shape every provider uses.
    pub arguments: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    ContentFilter,
    ToolCalls,
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedResponse {
    pub content: String,
    pub reasoning_content: Option<String>,
    pub usage: Option<Usage>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub finish_reason: Option<FinishReason>,
    pub stop_sequence: Option<String>,
    pub is_stream: bool,
}
