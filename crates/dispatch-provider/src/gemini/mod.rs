use async_trait::async_trait;
use dispatch_common::ProviderKind;
use dispatch_protocol::gemini::{
    Content as WireContent, FunctionCall, FunctionCallingConfig, FunctionCallingMode,
    FunctionDeclaration, FunctionResponse, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, InlineData, ModelsListResponse, Part, ThinkingConfig, ToolConfig,
    ToolDef as WireToolDef,
};
use dispatch_protocol::sse::SseParser;
use dispatch_transform::finish_reason::from_gemini;
use dispatch_transform::model::{
    Content, ContentPart, MediaSource, Message, NormalizedRequest, NormalizedResponse, Role,
    ToolCall, ToolChoice, ToolDefinition, Usage,
};
use dispatch_transform::{apply_custom_parameters, clean_payload, parse_message_contents};
use serde_json::Value;

use crate::adapter::{finalize_headers, ChatAdapter, DispatchContext, ModelDescriptor};
use crate::error::TransportError;
use crate::transport::{next_chunk, Transport};
use crate::url::{build_gemini_url, gemini_generate_content_endpoint, gemini_models_endpoint};

pub struct GeminiAdapter;

/// Maps a document/audio/video part's base64 source onto `inlineData`.
/// `fileData.fileUri` (this source's `Url`/`FileId` variants) has no
/// implementation here — see DESIGN.md's Open Question resolution — so a
/// part carrying one is an explicit `Parse` error rather than a silent drop
/// that would misrepresent an attachment as delivered.
fn media_source_to_inline_data(source: &MediaSource) -> Result<InlineData, TransportError> {
    match source {
        MediaSource::Base64 { data, mime } => Ok(InlineData {
            mime_type: mime.clone().unwrap_or_else(|| "application/octet-stream".to_string()),
            data: data.clone(),
        }),
        MediaSource::Url { .. } | MediaSource::FileId { .. } => Err(TransportError::Parse(
            "gemini adapter does not implement fileData.fileUri uploads; only base64 media sources are supported".to_string(),
        )),
    }
}

fn wire_parts(parts: &[ContentPart]) -> Result<Vec<Part>, TransportError> {
    let grouped = parse_message_contents(parts);
    let mut out = Vec::new();
    for part in &grouped.text {
        if let ContentPart::Text { text, .. } = part {
            out.push(Part {
                text: Some(text.clone()),
                inline_data: None,
                function_call: None,
                function_response: None,
                thought: None,
            });
        }
    }
    for part in &grouped.image {
        if let ContentPart::Image { data, mime, .. } = part {
            out.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: mime.clone().unwrap_or_else(|| "image/png".to_string()),
                    data: data.clone(),
                }),
                function_call: None,
                function_response: None,
                thought: None,
            });
        }
    }
    for part in &grouped.tool_use {
        if let ContentPart::ToolUse { name, input, .. } = part {
            out.push(Part {
                text: None,
                inline_data: None,
                function_call: Some(FunctionCall {
                    name: name.clone(),
                    args: input.clone(),
                }),
                function_response: None,
                thought: None,
            });
        }
    }
    for part in &grouped.tool_result {
        // The normalized model carries no separate function name for a
        // tool result (just id, payload and isError); Gemini's
        // `functionResponse.name` must reference one, so the tool-use id
        // doubles as the name here.
        if let ContentPart::ToolResult { id, content, .. } = part {
            out.push(Part {
                text: None,
                inline_data: None,
                function_call: None,
                function_response: Some(FunctionResponse {
                    name: id.clone(),
                    response: serde_json::json!({"result": content}),
                }),
                thought: None,
            });
        }
    }
    for part in grouped.document.iter().chain(&grouped.audio).chain(&grouped.video) {
        let source = match part {
            ContentPart::Document { source, .. }
            | ContentPart::Audio { source }
            | ContentPart::Video { source } => source,
            _ => continue,
        };
        out.push(Part {
            text: None,
            inline_data: Some(media_source_to_inline_data(source)?),
            function_call: None,
            function_response: None,
            thought: None,
        });
    }
    Ok(out)
}

/// Converts a normalized message list into `contents` + `systemInstruction`.
/// Shared with the Vertex AI Google-publisher path, which uses this exact
/// wire shape.
pub fn contents_and_system(
    request: &NormalizedRequest,
) -> Result<(Vec<WireContent>, Option<WireContent>), TransportError> {
    let mut system_parts: Vec<String> = Vec::new();
    let mut contents = Vec::new();
    for message in &request.messages {
        if message.role == Role::System {
            let text = match &message.content {
                Content::Text(text) => text.clone(),
                Content::Parts(parts) => parts
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text, .. } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(""),
            };
            system_parts.push(text);
            continue;
        }
        let role = match message.role {
            Role::Assistant => "model",
            _ => "user",
        };
        let parts = match &message.content {
            Content::Text(text) => vec![Part {
                text: Some(text.clone()),
                inline_data: None,
                function_call: None,
                function_response: None,
                thought: None,
            }],
            Content::Parts(parts) => wire_parts(parts)?,
        };
        contents.push(WireContent {
            role: Some(role.to_string()),
            parts,
        });
    }
    let system_instruction = if system_parts.is_empty() {
        None
    } else {
        Some(WireContent {
            role: None,
            parts: vec![Part {
                text: Some(system_parts.join("\n\n")),
                inline_data: None,
                function_call: None,
                function_response: None,
                thought: None,
            }],
        })
    };
    Ok((contents, system_instruction))
}

fn build_tools(tools: &[ToolDefinition]) -> Vec<WireToolDef> {
    if tools.is_empty() {
        return Vec::new();
    }
    vec![WireToolDef {
        function_declarations: tools
            .iter()
            .map(|tool| FunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            })
            .collect(),
    }]
}

fn tool_config(choice: &ToolChoice) -> ToolConfig {
    let (mode, allowed) = match choice {
        ToolChoice::Auto => (FunctionCallingMode::AUTO, None),
        ToolChoice::None => (FunctionCallingMode::NONE, None),
        ToolChoice::Required => (FunctionCallingMode::ANY, None),
        ToolChoice::Function { name } => (FunctionCallingMode::ANY, Some(vec![name.clone()])),
    };
    ToolConfig {
        function_calling_config: FunctionCallingConfig {
            mode,
            allowed_function_names: allowed,
        },
    }
}

/// Builds the `GenerateContentRequest` body shared by Gemini direct access
/// and Vertex AI's Google-publisher path.
pub fn build_generate_content_request(
    request: &NormalizedRequest,
) -> Result<GenerateContentRequest, TransportError> {
    let (contents, system_instruction) = contents_and_system(request)?;
    let tools = build_tools(&request.tools);

    let generation_config = GenerationConfig {
        temperature: request.params.temperature,
        top_p: request.params.top_p,
        top_k: request.params.top_k,
        max_output_tokens: request.params.max_tokens,
        stop_sequences: if request.params.stop.is_empty() {
            None
        } else {
            Some(request.params.stop.clone())
        },
        thinking_config: if request.thinking.enabled || request.thinking.include_thoughts {
            Some(ThinkingConfig {
                include_thoughts: Some(request.thinking.include_thoughts),
                thinking_budget: request.thinking.budget_tokens,
                thinking_level: request.thinking.effort_level.clone(),
            })
        } else {
            None
        },
    };

    Ok(GenerateContentRequest {
        contents,
        system_instruction,
        tools: if tools.is_empty() { None } else { Some(tools) },
        tool_config: request.tool_choice.as_ref().map(tool_config),
        generation_config: Some(generation_config),
        extra: Default::default(),
    })
}

pub(crate) fn build_body(request: &NormalizedRequest) -> Result<Value, TransportError> {
    let wire = build_generate_content_request(request)?;
    let mut body =
        crate::util::value_to_object(serde_json::to_value(&wire).expect("wire request serializes"));
    apply_custom_parameters(&mut body, &request.extra);
    clean_payload(&mut body);
    Ok(crate::util::object_to_value(body))
}

fn default_headers(api_key: &str) -> std::collections::BTreeMap<String, String> {
    let mut headers = std::collections::BTreeMap::new();
    headers.insert("x-goog-api-key".to_string(), api_key.to_string());
    headers.insert(
        "x-goog-api-client".to_string(),
        "dispatch-core/1".to_string(),
    );
    headers
}

pub(crate) fn normalize_candidate(response: GenerateContentResponse) -> NormalizedResponse {
    let candidate = response.candidates.into_iter().next();
    let mut content = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();
    if let Some(candidate) = &candidate {
        if let Some(wire_content) = &candidate.content {
            for (idx, part) in wire_content.parts.iter().enumerate() {
                if let Some(text) = &part.text {
                    if part.thought == Some(true) {
                        reasoning.push_str(text);
                    } else {
                        content.push_str(text);
                    }
                }
                if let Some(call) = &part.function_call {
                    tool_calls.push(ToolCall {
                        id: format!("call_{idx}"),
                        name: call.name.clone(),
                        arguments: call.args.to_string(),
                    });
                }
            }
        }
    }
    NormalizedResponse {
        content,
        reasoning_content: if reasoning.is_empty() {
            None
        } else {
            Some(reasoning)
        },
        usage: response.usage_metadata.map(|u| Usage {
            prompt_tokens: Some(u.prompt_token_count),
            completion_tokens: Some(u.candidates_token_count),
            total_tokens: Some(u.total_token_count),
        }),
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        finish_reason: candidate
            .and_then(|c| c.finish_reason)
            .as_deref()
            .map(from_gemini),
        stop_sequence: None,
        is_stream: false,
    }
}

/// Drives a `GenerateContentResponse` JSON-array/SSE stream to a
/// `NormalizedResponse`, routing `thought:true` parts to
/// `onReasoningStream`. Shared by the direct Gemini adapter and the Vertex
/// AI Google-publisher path (`crate::vertex`), which emits the identical
/// `GenerateContentResponse` shape.
pub(crate) async fn parse_stream(
    mut response: wreq::Response,
    ctx: &DispatchContext,
) -> Result<NormalizedResponse, TransportError> {
    let mut parser = SseParser::new();
    let mut text = String::new();
    let mut reasoning = String::new();
    let mut usage = None;
    let mut finish_reason = None;
    let mut tool_calls = Vec::new();

    let mut feed = |data: &str| {
        let Ok(parsed) = serde_json::from_str::<GenerateContentResponse>(data) else {
            return;
        };
        if let Some(u) = parsed.usage_metadata {
            usage = Some(Usage {
                prompt_tokens: Some(u.prompt_token_count),
                completion_tokens: Some(u.candidates_token_count),
                total_tokens: Some(u.total_token_count),
            });
        }
        if let Some(candidate) = parsed.candidates.into_iter().next() {
            if let Some(reason) = candidate.finish_reason {
                finish_reason = Some(from_gemini(&reason));
            }
            if let Some(wire_content) = candidate.content {
                for (idx, part) in wire_content.parts.into_iter().enumerate() {
                    if let Some(t) = part.text {
                        if part.thought == Some(true) {
                            reasoning.push_str(&t);
                            ctx.sink.on_reasoning(&t);
                        } else {
                            text.push_str(&t);
                            ctx.sink.on_text(&t);
                        }
                    }
                    if let Some(call) = part.function_call {
                        tool_calls.push(ToolCall {
                            id: format!("call_{idx}"),
                            name: call.name,
                            arguments: call.args.to_string(),
                        });
                    }
                }
            }
        }
    };

    while let Some(chunk) = next_chunk(&mut response, &ctx.cancellation).await? {
        for event in parser.push_bytes(&chunk) {
            feed(&event.data);
        }
    }
    for event in parser.finish() {
        feed(&event.data);
    }

    Ok(NormalizedResponse {
        content: text,
        reasoning_content: if reasoning.is_empty() {
            None
        } else {
            Some(reasoning)
        },
        usage,
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        finish_reason,
        stop_sequence: None,
        is_stream: true,
    })
}

#[async_trait]
impl ChatAdapter for GeminiAdapter {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn chat(
        &self,
        transport: &Transport,
        request: &NormalizedRequest,
        ctx: &DispatchContext,
    ) -> Result<NormalizedResponse, TransportError> {
        let endpoint = ctx.custom_endpoint.clone().unwrap_or_else(|| {
            gemini_generate_content_endpoint(&request.model_id, ctx.stream)
        });
        let url = build_gemini_url(&ctx.base_url, &endpoint);
        let headers = finalize_headers(default_headers(&ctx.api_key), &ctx.custom_headers);
        let body = build_body(request);

        if !ctx.stream {
            let envelope = transport
                .send_json(
                    wreq::Method::POST,
                    &url,
                    &headers,
                    Some(&body),
                    ctx.timeout,
                    &ctx.cancellation,
                )
                .await?;
            let parsed: GenerateContentResponse = serde_json::from_slice(&envelope.body)
                .map_err(|err| TransportError::Parse(err.to_string()))?;
            return Ok(normalize_candidate(parsed));
        }

        let url = format!("{url}?alt=sse");
        let response = transport
            .open_stream(
                wreq::Method::POST,
                &url,
                &headers,
                Some(&body),
                ctx.timeout,
                &ctx.cancellation,
            )
            .await?;
        parse_stream(response, ctx).await
    }

    async fn list_models(
        &self,
        transport: &Transport,
        ctx: &DispatchContext,
    ) -> Result<Vec<ModelDescriptor>, TransportError> {
        let url = build_gemini_url(&ctx.base_url, gemini_models_endpoint());
        let headers = finalize_headers(default_headers(&ctx.api_key), &ctx.custom_headers);
        let envelope = transport
            .send_json(
                wreq::Method::GET,
                &url,
                &headers,
                None,
                ctx.timeout,
                &ctx.cancellation,
            )
            .await?;
        let parsed: ModelsListResponse = serde_json::from_slice(&envelope.body)
            .map_err(|err| TransportError::Parse(err.to_string()))?;
        Ok(parsed
            .models
            .into_iter()
            .map(|m| ModelDescriptor { id: m.name })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_transform::model::{GenerationParams, ThinkingControl};

    #[test]
    fn routes_thought_parts_to_reasoning_and_rest_to_content() {
        let response = GenerateContentResponse {
            candidates: vec![dispatch_protocol::gemini::Candidate {
                content: Some(WireContent {
                    role: Some("model".to_string()),
                    parts: vec![
                        Part {
                            text: Some("Let me think.".to_string()),
                            inline_data: None,
                            function_call: None,
                            function_response: None,
                            thought: Some(true),
                        },
                        Part {
                            text: Some("42.".to_string()),
                            inline_data: None,
                            function_call: None,
                            function_response: None,
                            thought: None,
                        },
                    ],
                }),
                finish_reason: Some("STOP".to_string()),
            }],
            usage_metadata: None,
        };
        let normalized = normalize_candidate(response);
        assert_eq!(normalized.content, "42.");
        assert_eq!(normalized.reasoning_content.as_deref(), Some("Let me think."));
    }

    #[test]
    fn builds_request_without_tools_or_thinking_by_default() {
        let request = NormalizedRequest {
            model_id: "gemini-2.0-flash".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: Content::Text("hi".to_string()),
            }],
            params: GenerationParams::default(),
            tools: vec![],
            tool_choice: None,
            parallel_tool_calls: None,
            thinking: ThinkingControl::default(),
            extra: Default::default(),
        };
        let wire = build_generate_content_request(&request);
        assert!(wire.tools.is_none());
        assert!(wire.generation_config.unwrap().thinking_config.is_none());
    }
}
