use serde_json::{json, Value};

use crate::model::{GenerationParams, JsonObject, ToolChoice, ToolDefinition};

/// Copies only the generation parameters the caller actually supplied into a
/// canonical-named `JsonObject`. An unset parameter is never emitted, even
/// as an explicit `null`. Adapters that use the provider's
/// own field names unchanged (OpenAI-compatible) can extend this map
/// directly; adapters that rename fields (Cohere's `p`/`k`, Gemini's
/// `stopSequences`) read straight off `GenerationParams` instead.
pub fn extract_common_parameters(params: &GenerationParams) -> JsonObject {
    let mut body = JsonObject::new();
    if let Some(v) = params.temperature {
        body.insert("temperature".to_string(), json!(v));
    }
    if let Some(v) = params.top_p {
        body.insert("top_p".to_string(), json!(v));
    }
    if let Some(v) = params.top_k {
        body.insert("top_k".to_string(), json!(v));
    }
    if let Some(v) = params.max_tokens {
        body.insert("max_tokens".to_string(), json!(v));
    }
    if let Some(v) = params.frequency_penalty {
        body.insert("frequency_penalty".to_string(), json!(v));
    }
    if let Some(v) = params.presence_penalty {
        body.insert("presence_penalty".to_string(), json!(v));
    }
    if let Some(v) = params.seed {
        body.insert("seed".to_string(), json!(v));
    }
    if !params.stop.is_empty() {
        body.insert("stop".to_string(), json!(params.stop));
    }
    body
}

/// Normalizes tool definitions to the `{name, description, parameters,
/// strict?}` tuple shape every adapter maps onto its own wire tool schema
/// The normalized model already stores tools in this shape, so this is an
/// identity pass that exists to name the operation explicitly.
pub fn extract_tool_definitions(tools: &[ToolDefinition]) -> &[ToolDefinition] {
    tools
}

/// Reduces an optional tool-choice policy to the normalized enum,
/// defaulting to `Auto` when the caller didn't specify one
/// (mirroring every adapter's "default to automatic tool selection"
/// behavior).
pub fn parse_tool_choice(tool_choice: Option<&ToolChoice>) -> ToolChoice {
    tool_choice.cloned().unwrap_or(ToolChoice::Auto)
}

/// Renders a tool's JSON Schema `parameters` value, defaulting to an empty
/// object schema when a tool was declared without one.
pub fn tool_parameters_or_empty(tool: &ToolDefinition) -> Value {
    if tool.parameters.is_null() {
        json!({"type": "object", "properties": {}})
    } else {
        tool.parameters.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omits_unset_parameters() {
        let params = GenerationParams {
            temperature: Some(0.3),
            max_tokens: Some(100),
            ..Default::default()
        };
        let body = extract_common_parameters(&params);
        assert_eq!(body.len(), 2);
        assert!(!body.contains_key("top_p"));
    }

    #[test]
    fn tool_choice_defaults_to_auto() {
        assert_eq!(parse_tool_choice(None), ToolChoice::Auto);
        assert_eq!(
            parse_tool_choice(Some(&ToolChoice::Required)),
            ToolChoice::Required
        );
    }
}
