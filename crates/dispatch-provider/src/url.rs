//! URL construction for every provider. Every builder honors the trailing
//! `#` escape hatch first: a base URL ending in `#` is taken verbatim (minus
//! the `#`) with only the endpoint appended, bypassing all version-suffix
//! logic. This is a deliberate door out for pre-formed URLs, not a bug.

fn escape_hatch(base_url: &str, endpoint: Option<&str>) -> Option<String> {
    let stripped = base_url.strip_suffix('#')?;
    let mut url = stripped.trim_end_matches('/').to_string();
    if let Some(endpoint) = endpoint {
        url.push('/');
        url.push_str(endpoint.trim_start_matches('/'));
    }
    Some(url)
}

fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

fn join(base: &str, endpoint: &str) -> String {
    format!("{base}{}", endpoint.trim_start_matches('/'))
}

/// OpenAI-compatible: append `v1/` unless the path already has a version
/// segment (`/v1`, `/v2`, `/v3`, `/api/v`).
pub fn build_openai_url(base_url: &str, endpoint: &str) -> String {
    if let Some(url) = escape_hatch(base_url, Some(endpoint)) {
        return url;
    }
    let mut base = ensure_trailing_slash(base_url);
    let has_version = ["/v1", "/v2", "/v3", "/api/v"]
        .iter()
        .any(|marker| base.contains(marker));
    if !has_version {
        base.push_str("v1/");
    }
    join(&base, endpoint)
}

pub const OPENAI_CHAT_ENDPOINT: &str = "chat/completions";
pub const OPENAI_MODELS_ENDPOINT: &str = "models";
pub const OPENAI_RESPONSES_ENDPOINT: &str = "responses";

/// Anthropic Claude: append `v1/` unless present.
pub fn build_claude_url(base_url: &str, endpoint: &str) -> String {
    if let Some(url) = escape_hatch(base_url, Some(endpoint)) {
        return url;
    }
    let mut base = ensure_trailing_slash(base_url);
    if !base.contains("/v1") {
        base.push_str("v1/");
    }
    join(&base, endpoint)
}

pub const CLAUDE_MESSAGES_ENDPOINT: &str = "messages";
pub const CLAUDE_MODELS_ENDPOINT: &str = "models";

/// Gemini: append `v1beta/` unless present; the endpoint selects the
/// operation via the `:generateContent` / `:streamGenerateContent` suffix.
pub fn build_gemini_url(base_url: &str, endpoint: &str) -> String {
    if let Some(url) = escape_hatch(base_url, Some(endpoint)) {
        return url;
    }
    let mut base = ensure_trailing_slash(base_url);
    if !base.contains("/v1beta") {
        base.push_str("v1beta/");
    }
    join(&base, endpoint)
}

pub fn gemini_generate_content_endpoint(model: &str, stream: bool) -> String {
    let op = if stream {
        "streamGenerateContent"
    } else {
        "generateContent"
    };
    format!("models/{model}:{op}")
}

pub fn gemini_models_endpoint() -> &'static str {
    "models"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexPublisher {
    Google,
    Anthropic,
}

impl VertexPublisher {
    fn as_str(self) -> &'static str {
        match self {
            VertexPublisher::Google => "google",
            VertexPublisher::Anthropic => "anthropic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexOperation {
    GenerateContent,
    StreamGenerateContent,
    RawPredict,
    StreamRawPredict,
}

impl VertexOperation {
    fn as_str(self) -> &'static str {
        match self {
            VertexOperation::GenerateContent => "generateContent",
            VertexOperation::StreamGenerateContent => "streamGenerateContent",
            VertexOperation::RawPredict => "rawPredict",
            VertexOperation::StreamRawPredict => "streamRawPredict",
        }
    }
}

/// Vertex AI: append `v1/`; endpoint is
/// `publishers/{publisher}/models/{model}:{operation}`.
pub fn build_vertex_url(
    base_url: &str,
    publisher: VertexPublisher,
    model: &str,
    operation: VertexOperation,
) -> String {
    let endpoint = format!(
        "publishers/{}/models/{model}:{}",
        publisher.as_str(),
        operation.as_str()
    );
    if let Some(url) = escape_hatch(base_url, Some(&endpoint)) {
        return url;
    }
    let mut base = ensure_trailing_slash(base_url);
    if !base.contains("/v1/") && !base.ends_with("/v1") {
        base.push_str("v1/");
    }
    join(&base, &endpoint)
}

/// Cohere v2: append `v2/`, stripping any pre-existing `/v1` suffix first.
pub fn build_cohere_url(base_url: &str, endpoint: &str) -> String {
    if let Some(url) = escape_hatch(base_url, Some(endpoint)) {
        return url;
    }
    let trimmed = base_url.trim_end_matches('/');
    let without_v1 = trimmed.strip_suffix("/v1").unwrap_or(trimmed);
    let mut base = ensure_trailing_slash(without_v1);
    if !base.contains("/v2") {
        base.push_str("v2/");
    }
    join(&base, endpoint)
}

pub const COHERE_CHAT_ENDPOINT: &str = "chat";
pub const COHERE_MODELS_ENDPOINT: &str = "models";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_url_adds_v1_once() {
        assert_eq!(
            build_openai_url("https://api.example.com", "chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            build_openai_url("https://api.example.com/v3/", "chat/completions"),
            "https://api.example.com/v3/chat/completions"
        );
    }

    #[test]
    fn trailing_hash_is_a_verbatim_escape_hatch() {
        assert_eq!(
            build_openai_url("https://api.example.com/custom#", "chat/completions"),
            "https://api.example.com/custom/chat/completions"
        );
    }

    #[test]
    fn claude_url_adds_v1() {
        assert_eq!(
            build_claude_url("https://api.anthropic.com", "messages"),
            "https://api.anthropic.com/v1/messages"
        );
    }

    #[test]
    fn gemini_url_adds_v1beta_and_operation_suffix() {
        let endpoint = gemini_generate_content_endpoint("gemini-2.0-flash", true);
        assert_eq!(
            build_gemini_url("https://generativelanguage.googleapis.com", &endpoint),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:streamGenerateContent"
        );
    }

    #[test]
    fn vertex_url_uses_publisher_model_operation_shape() {
        assert_eq!(
            build_vertex_url(
                "https://us-central1-aiplatform.googleapis.com",
                VertexPublisher::Anthropic,
                "claude-3-5-sonnet",
                VertexOperation::StreamRawPredict,
            ),
            "https://us-central1-aiplatform.googleapis.com/v1/publishers/anthropic/models/claude-3-5-sonnet:streamRawPredict"
        );
    }

    #[test]
    fn cohere_url_replaces_v1_with_v2() {
        assert_eq!(
            build_cohere_url("https://api.cohere.com/v1", "chat"),
            "https://api.cohere.com/v2/chat"
        );
        assert_eq!(
            build_cohere_url("https://api.cohere.com", "chat"),
            "https://api.cohere.com/v2/chat"
        );
    }
}
