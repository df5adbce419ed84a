use std::collections::BTreeMap;

use async_trait::async_trait;
use dispatch_common::ProviderKind;
use dispatch_protocol::openai::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
    ContentPart as WireContentPart, FileBlock, ImageUrl, MessageContent, ModelsListResponse,
    ToolCallFunction, ToolCallWire, ToolDef, ToolDefKind, ToolFunctionDef,
};
use dispatch_protocol::sse::{is_done_sentinel, SseParser};
use dispatch_transform::finish_reason::from_openai;
use dispatch_transform::model::{
    Content, ContentPart, MediaSource, Message, NormalizedRequest, NormalizedResponse, Role,
    ToolCall, ToolChoice, ToolDefinition, Usage,
};
use dispatch_transform::{
    apply_custom_parameters, clean_payload, infer_image_mime, parse_message_contents,
};
use serde_json::{json, Value};

use crate::adapter::{finalize_headers, ChatAdapter, DispatchContext, ModelDescriptor};
use crate::error::TransportError;
use crate::transport::{next_chunk, Transport};
use crate::url::{build_openai_url, OPENAI_CHAT_ENDPOINT, OPENAI_MODELS_ENDPOINT};
use crate::util::{object_to_value, value_to_object};

/// The OpenAI Chat Completions adapter, and the default for any provider
/// type the Dispatcher doesn't recognize, since many third parties
/// claim the OpenAI wire shape for their own endpoints.
pub struct OpenAiAdapter;

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn message_to_wire(message: &Message) -> ChatMessage {
    let role = role_str(message.role).to_string();
    match &message.content {
        Content::Text(text) => ChatMessage {
            role,
            content: Some(MessageContent::Text(text.clone())),
            tool_calls: None,
            tool_call_id: None,
        },
        Content::Parts(parts) => {
            let grouped = parse_message_contents(parts);

            if let Some(ContentPart::ToolResult { id, content, .. }) =
                grouped.tool_result.first().copied()
            {
                return ChatMessage {
                    role: "tool".to_string(),
                    content: Some(MessageContent::Text(content.clone())),
                    tool_calls: None,
                    tool_call_id: Some(id.clone()),
                };
            }

            let mut wire_parts = Vec::new();
            for part in &grouped.text {
                if let ContentPart::Text { text, .. } = part {
                    wire_parts.push(WireContentPart::Text { text: text.clone() });
                }
            }
            for part in &grouped.image {
                if let ContentPart::Image { data, mime, .. } = part {
                    let mime = mime
                        .clone()
                        .unwrap_or_else(|| infer_image_mime(None, data).to_string());
                    wire_parts.push(WireContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:{mime};base64,{data}"),
                        },
                    });
                }
            }
            for part in &grouped.document {
                if let ContentPart::Document { source, .. } = part {
                    if let MediaSource::Base64 { data, mime } = source {
                        let mime = mime.clone().unwrap_or_else(|| "application/pdf".to_string());
                        wire_parts.push(WireContentPart::File {
                            file: FileBlock {
                                filename: None,
                                file_data: format!("data:{mime};base64,{data}"),
                            },
                        });
                    }
                }
            }

            let tool_calls: Vec<ToolCallWire> = grouped
                .tool_use
                .iter()
                .filter_map(|part| {
                    if let ContentPart::ToolUse { id, name, input } = part {
                        Some(ToolCallWire {
                            id: id.clone(),
                            kind: ToolDefKind::Function,
                            function: ToolCallFunction {
                                name: name.clone(),
                                arguments: input.to_string(),
                            },
                        })
                    } else {
                        None
                    }
                })
                .collect();

            ChatMessage {
                role,
                content: if wire_parts.is_empty() {
                    None
                } else {
                    Some(MessageContent::Parts(wire_parts))
                },
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
                tool_call_id: None,
            }
        }
    }
}

fn build_tools(tools: &[ToolDefinition]) -> Vec<ToolDef> {
    tools
        .iter()
        .map(|tool| ToolDef {
            kind: ToolDefKind::Function,
            function: ToolFunctionDef {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
                strict: tool.strict,
            },
        })
        .collect()
}

fn tool_choice_to_wire(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Function { name } => json!({
            "type": "function",
            "function": {"name": name},
        }),
    }
}

pub(crate) fn build_body(request: &NormalizedRequest, stream: bool) -> Value {
    let tools = build_tools(&request.tools);
    let wire = ChatCompletionRequest {
        model: request.model_id.clone(),
        messages: request.messages.iter().map(message_to_wire).collect(),
        temperature: request.params.temperature,
        top_p: request.params.top_p,
        max_tokens: request.params.max_tokens,
        stop: if request.params.stop.is_empty() {
            None
        } else {
            Some(request.params.stop.clone())
        },
        presence_penalty: request.params.presence_penalty,
        frequency_penalty: request.params.frequency_penalty,
        seed: request.params.seed,
        reasoning_effort: request.thinking.effort_level.clone(),
        tools: if tools.is_empty() { None } else { Some(tools) },
        tool_choice: request.tool_choice.as_ref().map(tool_choice_to_wire),
        stream: Some(stream),
        extra: Default::default(),
    };

    let mut body = value_to_object(serde_json::to_value(&wire).expect("wire request serializes"));
    apply_custom_parameters(&mut body, &request.extra);
    clean_payload(&mut body);
    object_to_value(body)
}

fn default_headers(api_key: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("Authorization".to_string(), format!("Bearer {api_key}"));
    headers
}

fn normalize_response(response: ChatCompletionResponse) -> NormalizedResponse {
    let choice = response.choices.into_iter().next();
    let message = choice.as_ref().and_then(|c| c.message.clone());
    let content = message
        .as_ref()
        .and_then(|m| match &m.content {
            Some(MessageContent::Text(text)) => Some(text.clone()),
            Some(MessageContent::Parts(parts)) => Some(
                parts
                    .iter()
                    .filter_map(|p| match p {
                        WireContentPart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(""),
            ),
            None => None,
        })
        .unwrap_or_default();

    let tool_calls = message.as_ref().and_then(|m| {
        m.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|call| ToolCall {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                })
                .collect::<Vec<_>>()
        })
    });

    NormalizedResponse {
        content,
        reasoning_content: None,
        usage: response.usage.map(|u| Usage {
            prompt_tokens: Some(u.prompt_tokens),
            completion_tokens: Some(u.completion_tokens),
            total_tokens: Some(u.total_tokens),
        }),
        tool_calls,
        finish_reason: choice
            .and_then(|c| c.finish_reason)
            .map(|r| from_openai(&r)),
        stop_sequence: None,
        is_stream: false,
    }
}

#[async_trait]
impl ChatAdapter for OpenAiAdapter {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    async fn chat(
        &self,
        transport: &Transport,
        request: &NormalizedRequest,
        ctx: &DispatchContext,
    ) -> Result<NormalizedResponse, TransportError> {
        let endpoint = ctx
            .custom_endpoint
            .as_deref()
            .unwrap_or(OPENAI_CHAT_ENDPOINT);
        let url = build_openai_url(&ctx.base_url, endpoint);
        let headers = finalize_headers(default_headers(&ctx.api_key), &ctx.custom_headers);
        let body = build_body(request, ctx.stream);

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
            let parsed: ChatCompletionResponse = serde_json::from_slice(&envelope.body)
                .map_err(|err| TransportError::Parse(err.to_string()))?;
            return Ok(normalize_response(parsed));
        }

        let mut response = transport
            .open_stream(
                wreq::Method::POST,
                &url,
                &headers,
                Some(&body),
                ctx.timeout,
                &ctx.cancellation,
            )
            .await?;

        let mut parser = SseParser::new();
        let mut text = String::new();
        let mut reasoning = String::new();
        let mut finish_reason = None;
        let mut usage = None;
        let mut tool_calls: Vec<(Option<String>, String, String)> = Vec::new();

        while let Some(chunk) = next_chunk(&mut response, &ctx.cancellation).await? {
            for event in parser.push_bytes(&chunk) {
                if is_done_sentinel(&event) {
                    continue;
                }
                let parsed: ChatCompletionChunk = match serde_json::from_str(&event.data) {
                    Ok(parsed) => parsed,
                    Err(_) => continue,
                };
                if let Some(u) = parsed.usage {
                    usage = Some(Usage {
                        prompt_tokens: Some(u.prompt_tokens),
                        completion_tokens: Some(u.completion_tokens),
                        total_tokens: Some(u.total_tokens),
                    });
                }
                for choice in parsed.choices {
                    if let Some(reason) = choice.finish_reason {
                        finish_reason = Some(from_openai(&reason));
                    }
                    if let Some(content) = choice.delta.content {
                        text.push_str(&content);
                        ctx.sink.on_text(&content);
                    }
                    if let Some(reasoning_chunk) = choice.delta.reasoning_content {
                        reasoning.push_str(&reasoning_chunk);
                        ctx.sink.on_reasoning(&reasoning_chunk);
                    }
                    if let Some(deltas) = choice.delta.tool_calls {
                        for delta in deltas {
                            while tool_calls.len() <= delta.index {
                                tool_calls.push((None, String::new(), String::new()));
                            }
                            let entry = &mut tool_calls[delta.index];
                            if let Some(id) = delta.id {
                                entry.0 = Some(id);
                            }
                            if let Some(name) = delta.function.name {
                                entry.1.push_str(&name);
                            }
                            if let Some(args) = delta.function.arguments {
                                entry.2.push_str(&args);
                            }
                        }
                    }
                }
            }
        }
        for event in parser.finish() {
            if !is_done_sentinel(&event) {
                if let Ok(parsed) = serde_json::from_str::<ChatCompletionChunk>(&event.data) {
                    for choice in parsed.choices {
                        if let Some(content) = choice.delta.content {
                            text.push_str(&content);
                            ctx.sink.on_text(&content);
                        }
                    }
                }
            }
        }

        let tool_calls = if tool_calls.is_empty() {
            None
        } else {
            Some(
                tool_calls
                    .into_iter()
                    .enumerate()
                    .map(|(idx, (id, name, arguments))| ToolCall {
                        id: id.unwrap_or_else(|| format!("call_{idx}")),
                        name,
                        arguments,
                    })
                    .collect(),
            )
        };

        Ok(NormalizedResponse {
            content: text,
            reasoning_content: if reasoning.is_empty() {
                None
            } else {
                Some(reasoning)
            },
            usage,
            tool_calls,
            finish_reason,
            stop_sequence: None,
            is_stream: true,
        })
    }

    async fn list_models(
        &self,
        transport: &Transport,
        ctx: &DispatchContext,
    ) -> Result<Vec<ModelDescriptor>, TransportError> {
        let url = build_openai_url(&ctx.base_url, OPENAI_MODELS_ENDPOINT);
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
            .data
            .into_iter()
            .map(|m| ModelDescriptor { id: m.id })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_transform::model::{GenerationParams, ThinkingControl};

    #[test]
    fn custom_extra_field_reaches_wire_body_and_reserved_keys_never_do() {
        let mut extra = dispatch_transform::model::JsonObject::new();
        extra.insert("logit_bias".to_string(), json!({"123": 1}));
        extra.insert("profileId".to_string(), json!("should-not-leak"));

        let request = NormalizedRequest {
            model_id: "gpt-4o".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: Content::Text("hi".to_string()),
            }],
            params: GenerationParams {
                temperature: Some(0.3),
                ..Default::default()
            },
            tools: vec![],
            tool_choice: None,
            parallel_tool_calls: None,
            thinking: ThinkingControl::default(),
            extra,
        };

        let body = build_body(&request, true);
        assert_eq!(body["model"], json!("gpt-4o"));
        assert_eq!(body["stream"], json!(true));
        assert_eq!(body["logit_bias"], json!({"123": 1}));
        assert!(body.get("profileId").is_none());
    }
}
