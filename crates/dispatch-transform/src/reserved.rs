use serde_json::Value;

use crate::model::JsonObject;

/// Request fields the core itself interprets; anything else is vendor
/// passthrough.
pub const RESERVED_KEYS: &[&str] = &[
    "messages",
    "modelId",
    "profileId",
    "stream",
    "onStream",
    "onReasoningStream",
    "signal",
    "timeout",
    "temperature",
    "maxTokens",
    "topP",
    "topK",
    "frequencyPenalty",
    "presencePenalty",
    "seed",
    "stop",
    "n",
    "logprobs",
    "topLogprobs",
    "maxCompletionTokens",
    "responseFormat",
    "tools",
    "toolChoice",
    "parallelToolCalls",
    "reasoningEffort",
    "thinkingEnabled",
    "thinkingBudget",
    "thinkingLevel",
    "includeThoughts",
    "webSearchOptions",
    "streamOptions",
    "user",
    "serviceTier",
    "logitBias",
    "store",
    "metadata",
    "stopSequences",
    "claudeMetadata",
    "safetySettings",
    "enableCodeExecution",
    "speechConfig",
    "responseModalities",
    "mediaResolution",
    "enableEnhancedCivicAnswers",
    "forceProxy",
    "relaxIdCerts",
    "http1Only",
    "hasLocalFile",
];

/// Fields that must never reach a serialized wire body even if something
/// upstream forgot to strip them from `extra`. A strict subset of
/// [`RESERVED_KEYS`]: the internal-only
/// control fields, not every reserved parameter name (plenty of reserved
/// names, like `temperature`, are meant to reach the wire body under their
/// own adapter-specific key).
pub const INTERNAL_ONLY_KEYS: &[&str] = &[
    "profileId",
    "onStream",
    "onReasoningStream",
    "signal",
    "timeout",
    "thinkingEnabled",
    "thinkingBudget",
    "thinkingLevel",
    "reasoningEffort",
    "includeThoughts",
    "forceProxy",
    "relaxIdCerts",
    "http1Only",
];

/// Copies every `extra` field not in the reserved set into `body`, shallow
/// merging where both sides have an object at the same key. The adapter's
/// own value wins per nested key; only genuinely new nested keys are added
/// from the custom side.
pub fn apply_custom_parameters(body: &mut JsonObject, extra: &JsonObject) {
    for (key, value) in extra {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        match (body.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                for (k, v) in incoming {
                    existing.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
            _ => {
                body.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Strips internal-only control fields from a wire body right before
/// serialization.
pub fn clean_payload(body: &mut JsonObject) {
    for key in INTERNAL_ONLY_KEYS {
        body.remove(*key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn custom_parameters_pass_through_and_shallow_merge() {
        let mut body = JsonObject::new();
        body.insert(
            "response_format".to_string(),
            json!({"type": "json_object"}),
        );
        let mut extra = JsonObject::new();
        extra.insert("vendor_flag".to_string(), json!(true));
        extra.insert(
            "response_format".to_string(),
            json!({"schema": {"type": "object"}}),
        );
        // reserved: must never leak through even if present in extra
        extra.insert("profileId".to_string(), json!("should-not-appear"));

        apply_custom_parameters(&mut body, &extra);

        assert_eq!(body.get("vendor_flag"), Some(&json!(true)));
        assert_eq!(
            body.get("response_format"),
            Some(&json!({"type": "json_object", "schema": {"type": "object"}}))
        );
        assert!(!body.contains_key("profileId"));
    }

    #[test]
    fn clean_payload_strips_internal_fields_only() {
        let mut body = JsonObject::new();
        body.insert("temperature".to_string(), json!(0.3));
        body.insert("thinkingEnabled".to_string(), json!(true));
        body.insert("signal".to_string(), json!("abort-controller"));

        clean_payload(&mut body);

        assert!(body.contains_key("temperature"));
        assert!(!body.contains_key("thinkingEnabled"));
        assert!(!body.contains_key("signal"));
    }
}
