use crate::model::FinishReason;

/// OpenAI family: `stop`, `length`, `content_filter`, `tool_calls`,
/// `function_call`.
pub fn from_openai(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::MaxTokens,
        "content_filter" => FinishReason::ContentFilter,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        _ => FinishReason::Other,
    }
}

/// Anthropic: `end_turn`, `stop_sequence`, `max_tokens`, `tool_use`,
/// `pause_turn`, `refusal`.
pub fn from_claude(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::MaxTokens,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

/// Gemini: `STOP`, `MAX_TOKENS`, `SAFETY`, `RECITATION`, `OTHER`.
pub fn from_gemini(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::MaxTokens,
        "SAFETY" | "RECITATION" => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

/// Cohere v2: `COMPLETE`, `MAX_TOKENS`, `TOOL_CALL`.
pub fn from_cohere(reason: &str) -> FinishReason {
    match reason {
        "COMPLETE" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::MaxTokens,
        "TOOL_CALL" => FinishReason::ToolCalls,
        _ => FinishReason::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_provider_specific_finish_reasons() {
        assert_eq!(from_claude("end_turn"), FinishReason::Stop);
        assert_eq!(from_gemini("MAX_TOKENS"), FinishReason::MaxTokens);
        assert_eq!(from_gemini("SAFETY"), FinishReason::ContentFilter);
        assert_eq!(from_openai("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(from_cohere("COMPLETE"), FinishReason::Stop);
    }
}
