use async_trait::async_trait;
use dispatch_common::ProviderKind;
use dispatch_protocol::cohere::{
    ChatMessage, ChatRequest, ChatResponse, ContentPart as WireContentPart, ImageUrl,
    MessageContent, ModelsListResponse, ResponseContentPart, StreamEvent, Thinking, ToolDef,
};
use dispatch_protocol::sse::SseParser;
use dispatch_transform::finish_reason::from_cohere;
use dispatch_transform::model::{
    Content, ContentPart, Message, NormalizedRequest, NormalizedResponse, Role, ToolDefinition,
    Usage,
};
use dispatch_transform::{apply_custom_parameters, clean_payload, parse_message_contents};
use serde_json::Value;

use crate::adapter::{finalize_headers, ChatAdapter, DispatchContext, ModelDescriptor};
use crate::error::TransportError;
use crate::transport::{next_chunk, Transport};
use crate::url::{build_cohere_url, COHERE_CHAT_ENDPOINT, COHERE_MODELS_ENDPOINT};
use crate::util::{object_to_value, value_to_object};

pub struct CohereAdapter;

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Cohere v2's `ChatMessage` carries only text/image-url content parts; a
/// tool-use or tool-result part has no dedicated slot in this wire shape
/// (unlike OpenAI/Claude), so it is flattened to its JSON text
/// representation rather than silently dropped.
fn message_to_wire(message: &Message) -> ChatMessage {
    let role = role_str(message.role).to_string();
    match &message.content {
        Content::Text(text) => ChatMessage {
            role,
            content: MessageContent::Text(text.clone()),
        },
        Content::Parts(parts) => {
            let grouped = parse_message_contents(parts);
            let mut wire_parts = Vec::new();
            for part in &grouped.text {
                if let ContentPart::Text { text, .. } = part {
                    wire_parts.push(WireContentPart::Text { text: text.clone() });
                }
            }
            for part in &grouped.image {
                if let ContentPart::Image { data, mime, .. } = part {
                    let mime = mime.clone().unwrap_or_else(|| "image/png".to_string());
                    wire_parts.push(WireContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:{mime};base64,{data}"),
                        },
                    });
                }
            }
            for part in &grouped.tool_use {
                if let ContentPart::ToolUse { name, input, .. } = part {
                    wire_parts.push(WireContentPart::Text {
                        text: format!("{{\"tool_use\":\"{name}\",\"input\":{input}}}"),
                    });
                }
            }
            for part in &grouped.tool_result {
                if let ContentPart::ToolResult { content, .. } = part {
                    wire_parts.push(WireContentPart::Text {
                        text: content.clone(),
                    });
                }
            }
            ChatMessage {
                role,
                content: MessageContent::Parts(wire_parts),
            }
        }
    }
}

fn build_tools(tools: &[ToolDefinition]) -> Vec<ToolDef> {
    tools
        .iter()
        .map(|tool| ToolDef {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        })
        .collect()
}

pub(crate) fn build_body(request: &NormalizedRequest, stream: bool) -> Value {
    let tools = build_tools(&request.tools);
    let wire = ChatRequest {
        model: request.model_id.clone(),
        messages: request.messages.iter().map(message_to_wire).collect(),
        temperature: request.params.temperature,
        p: request.params.top_p,
        k: request.params.top_k,
        max_tokens: request.params.max_tokens,
        stop_sequences: if request.params.stop.is_empty() {
            None
        } else {
            Some(request.params.stop.clone())
        },
        tools: if tools.is_empty() { None } else { Some(tools) },
        thinking: if request.thinking.enabled {
            Some(Thinking::Enabled {
                budget_tokens: request.thinking.budget_tokens.unwrap_or(4096),
            })
        } else {
            None
        },
        stream: Some(stream),
        extra: Default::default(),
    };

    let mut body = value_to_object(serde_json::to_value(&wire).expect("wire request serializes"));
    apply_custom_parameters(&mut body, &request.extra);
    clean_payload(&mut body);
    object_to_value(body)
}

fn default_headers(api_key: &str) -> std::collections::BTreeMap<String, String> {
    let mut headers = std::collections::BTreeMap::new();
    headers.insert("Authorization".to_string(), format!("Bearer {api_key}"));
    headers
}

fn normalize_response(response: ChatResponse) -> NormalizedResponse {
    let mut content = String::new();
    let mut reasoning = String::new();
    if let Some(message) = response.message {
        for part in message.content {
            match part {
                ResponseContentPart::Text { text } => content.push_str(&text),
                ResponseContentPart::Thinking { thinking } => reasoning.push_str(&thinking),
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
        usage: response.usage.and_then(|u| u.billed_units).map(|u| Usage {
            prompt_tokens: Some(u.input_tokens),
            completion_tokens: Some(u.output_tokens),
            total_tokens: Some(u.input_tokens + u.output_tokens),
        }),
        tool_calls: None,
        finish_reason: response.finish_reason.as_deref().map(from_cohere),
        stop_sequence: None,
        is_stream: false,
    }
}

#[async_trait]
impl ChatAdapter for CohereAdapter {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Cohere
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
            .unwrap_or(COHERE_CHAT_ENDPOINT);
        let url = build_cohere_url(&ctx.base_url, endpoint);
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
            let parsed: ChatResponse = serde_json::from_slice(&envelope.body)
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

        let mut feed = |data: &str| {
            let Ok(event) = serde_json::from_str::<StreamEvent>(data) else {
                return;
            };
            match event {
                StreamEvent::ContentDelta { delta } => {
                    if let Some(chunk) = delta.message.content.text {
                        text.push_str(&chunk);
                        ctx.sink.on_text(&chunk);
                    }
                    if let Some(chunk) = delta.message.content.thinking {
                        reasoning.push_str(&chunk);
                        ctx.sink.on_reasoning(&chunk);
                    }
                }
                StreamEvent::MessageEnd { delta } => {
                    if let Some(delta) = delta {
                        if let Some(reason) = delta.finish_reason {
                            finish_reason = Some(from_cohere(&reason));
                        }
                        if let Some(u) = delta.usage.and_then(|u| u.billed_units) {
                            usage = Some(Usage {
                                prompt_tokens: Some(u.input_tokens),
                                completion_tokens: Some(u.output_tokens),
                                total_tokens: Some(u.input_tokens + u.output_tokens),
                            });
                        }
                    }
                }
                StreamEvent::MessageStart | StreamEvent::ContentStart | StreamEvent::ContentEnd => {}
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
            tool_calls: None,
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
        let url = build_cohere_url(&ctx.base_url, COHERE_MODELS_ENDPOINT);
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
    fn maps_top_p_top_k_and_stop_to_cohere_field_names() {
        let request = NormalizedRequest {
            model_id: "command-r-plus".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: Content::Text("hi".to_string()),
            }],
            params: GenerationParams {
                top_p: Some(0.9),
                top_k: Some(40),
                stop: vec!["STOP".to_string()],
                ..Default::default()
            },
            tools: vec![],
            tool_choice: None,
            parallel_tool_calls: None,
            thinking: ThinkingControl::default(),
            extra: Default::default(),
        };
        let body = build_body(&request, false);
        assert_eq!(body["p"], serde_json::json!(0.9));
        assert_eq!(body["k"], serde_json::json!(40));
        assert_eq!(body["stop_sequences"], serde_json::json!(["STOP"]));
        assert!(body.get("topP").is_none());
    }
}
