use std::collections::BTreeMap;

use async_trait::async_trait;
use dispatch_common::ProviderKind;
use dispatch_protocol::claude::{
    CacheControl as WireCacheControl, ContentBlock, ContentBlockDelta, ContentBlockStart,
    CreateMessageRequest, CreateMessageResponse, ImageSource, Message as WireMessage,
    ModelsListResponse, Role as WireRole, StreamEvent, Thinking, ToolChoice as WireToolChoice,
    ToolDef,
};
use dispatch_protocol::sse::SseParser;
use dispatch_transform::finish_reason::from_claude;
use dispatch_transform::model::{
    Content, ContentPart, MediaSource, Message, NormalizedRequest, NormalizedResponse, Role,
    ToolCall, ToolChoice, ToolDefinition, Usage,
};
use dispatch_transform::{apply_custom_parameters, clean_payload, parse_message_contents};
use serde_json::Value;

use crate::adapter::{finalize_headers, ChatAdapter, DispatchContext, ModelDescriptor};
use crate::error::TransportError;
use crate::transport::{next_chunk, Transport};
use crate::url::{build_claude_url, CLAUDE_MESSAGES_ENDPOINT, CLAUDE_MODELS_ENDPOINT};
use crate::util::{object_to_value, value_to_object};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ClaudeAdapter;

fn wire_content_blocks(parts: &[ContentPart]) -> Vec<ContentBlock> {
    let grouped = parse_message_contents(parts);
    let mut blocks = Vec::new();
    for part in &grouped.text {
        if let ContentPart::Text { text, .. } = part {
            blocks.push(ContentBlock::Text {
                text: text.clone(),
                cache_control: None::<WireCacheControl>,
            });
        }
    }
    for part in &grouped.image {
        if let ContentPart::Image { data, mime, .. } = part {
            blocks.push(ContentBlock::Image {
                source: ImageSource::Base64 {
                    media_type: mime.clone().unwrap_or_else(|| "image/png".to_string()),
                    data: data.clone(),
                },
            });
        }
    }
    for part in &grouped.document {
        if let ContentPart::Document { source, .. } = part {
            if let MediaSource::Base64 { data, mime } = source {
                blocks.push(ContentBlock::Document {
                    source: ImageSource::Base64 {
                        media_type: mime.clone().unwrap_or_else(|| "application/pdf".to_string()),
                        data: data.clone(),
                    },
                });
            }
        }
    }
    for part in &grouped.tool_use {
        if let ContentPart::ToolUse { id, name, input } = part {
            blocks.push(ContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            });
        }
    }
    for part in &grouped.tool_result {
        if let ContentPart::ToolResult { id, content, is_error } = part {
            blocks.push(ContentBlock::ToolResult {
                tool_use_id: id.clone(),
                content: Value::String(content.clone()),
                is_error: if *is_error { Some(true) } else { None },
            });
        }
    }
    blocks
}

fn split_system_and_turns(request: &NormalizedRequest) -> (Option<String>, Vec<WireMessage>) {
    let mut system_parts = Vec::new();
    let mut turns = Vec::new();
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
            Role::Assistant => WireRole::Assistant,
            _ => WireRole::User,
        };
        let content = match &message.content {
            Content::Text(text) => vec![ContentBlock::Text {
                text: text.clone(),
                cache_control: None,
            }],
            Content::Parts(parts) => wire_content_blocks(parts),
        };
        turns.push(WireMessage { role, content });
    }
    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, turns)
}

fn build_tools(tools: &[ToolDefinition]) -> Vec<ToolDef> {
    tools
        .iter()
        .map(|tool| ToolDef {
            kind: "custom".to_string(),
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.parameters.clone(),
        })
        .collect()
}

fn tool_choice_to_wire(choice: &ToolChoice) -> WireToolChoice {
    match choice {
        ToolChoice::Auto | ToolChoice::None => WireToolChoice::Auto,
        ToolChoice::Required => WireToolChoice::Any,
        ToolChoice::Function { name } => WireToolChoice::Tool { name: name.clone() },
    }
}

pub(crate) fn build_body(request: &NormalizedRequest, stream: bool) -> Value {
    let (system, messages) = split_system_and_turns(request);
    let tools = build_tools(&request.tools);
    let thinking_enabled = request.thinking.enabled;

    let wire = CreateMessageRequest {
        model: request.model_id.clone(),
        messages,
        max_tokens: request.params.max_tokens.unwrap_or(4096),
        system,
        temperature: if thinking_enabled {
            None
        } else {
            request.params.temperature
        },
        top_p: request.params.top_p,
        top_k: request.params.top_k,
        stop_sequences: if request.params.stop.is_empty() {
            None
        } else {
            Some(request.params.stop.clone())
        },
        tools: if tools.is_empty() { None } else { Some(tools) },
        tool_choice: request.tool_choice.as_ref().map(tool_choice_to_wire),
        thinking: if thinking_enabled {
            Some(Thinking::Enabled {
                budget_tokens: request.thinking.budget_tokens.unwrap_or(4096),
            })
        } else {
            None
        },
        stream: Some(stream),
        disable_parallel_tool_use: request.parallel_tool_calls.and_then(|allowed| {
            if allowed {
                None
            } else {
                Some(true)
            }
        }),
        extra: Default::default(),
    };

    let mut body = value_to_object(serde_json::to_value(&wire).expect("wire request serializes"));
    apply_custom_parameters(&mut body, &request.extra);
    clean_payload(&mut body);
    object_to_value(body)
}

/// The Vertex AI Anthropic-publisher body: same `CreateMessageRequest` shape
/// with `model` dropped (the model is already in the URL there) and
/// `anthropic_version` added in its place.
pub(crate) fn build_vertex_body(request: &NormalizedRequest, stream: bool) -> Value {
    let mut body = value_to_object(build_body(request, stream));
    body.remove("model");
    body.insert(
        "anthropic_version".to_string(),
        Value::String(ANTHROPIC_VERSION.to_string()),
    );
    object_to_value(body)
}

fn default_headers(api_key: &str, thinking_enabled: bool) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("x-api-key".to_string(), api_key.to_string());
    headers.insert("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string());
    let mut betas = vec!["files-api-2025-04-14".to_string()];
    if thinking_enabled {
        betas.push("thinking-2025-12-05".to_string());
    }
    headers.insert("anthropic-beta".to_string(), betas.join(","));
    headers
}

pub(crate) fn normalize_response(response: CreateMessageResponse) -> NormalizedResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in response.content {
        match block {
            ContentBlock::Text { text: t, .. } => text.push_str(&t),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id,
                name,
                arguments: input.to_string(),
            }),
            _ => {}
        }
    }
    NormalizedResponse {
        content: text,
        reasoning_content: None,
        usage: response.usage.map(|u| Usage {
            prompt_tokens: Some(u.input_tokens),
            completion_tokens: Some(u.output_tokens),
            total_tokens: Some(u.input_tokens + u.output_tokens),
        }),
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        finish_reason: response.stop_reason.as_deref().map(from_claude),
        stop_sequence: response.stop_sequence,
        is_stream: false,
    }
}

/// Drives the Messages-API SSE event stream to a `NormalizedResponse`,
/// shared by the direct Claude adapter and the Vertex AI Anthropic-publisher
/// path (`crate::vertex`), which speaks the identical event shape once the
/// request reaches the model.
pub(crate) async fn parse_stream(
    mut response: wreq::Response,
    ctx: &DispatchContext,
) -> Result<NormalizedResponse, TransportError> {
    let mut parser = SseParser::new();
    let mut text = String::new();
    let mut reasoning = String::new();
    let mut usage = Usage::default();
    let mut finish_reason = None;
    let mut stop_sequence = None;
    let mut block_kinds: BTreeMap<usize, (String, String)> = BTreeMap::new();
    let mut pending_json: BTreeMap<usize, String> = BTreeMap::new();
    let mut tool_calls = Vec::new();

    let mut feed = |data: &str| -> Result<(), TransportError> {
        let event: StreamEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(_) => return Ok(()),
        };
        match event {
            StreamEvent::MessageStart { message } => {
                if let Some(u) = message.usage {
                    usage.prompt_tokens = Some(u.input_tokens);
                }
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                if let ContentBlockStart::ToolUse { id, name } = content_block {
                    block_kinds.insert(index, (id, name));
                }
            }
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                ContentBlockDelta::TextDelta { text: chunk } => {
                    text.push_str(&chunk);
                    ctx.sink.on_text(&chunk);
                }
                ContentBlockDelta::ThinkingDelta { thinking } => {
                    reasoning.push_str(&thinking);
                    ctx.sink.on_reasoning(&thinking);
                }
                ContentBlockDelta::InputJsonDelta { partial_json } => {
                    pending_json
                        .entry(index)
                        .or_default()
                        .push_str(&partial_json);
                }
            },
            StreamEvent::ContentBlockStop { index } => {
                if let Some((id, name)) = block_kinds.remove(&index) {
                    let arguments = pending_json.remove(&index).unwrap_or_default();
                    tool_calls.push(ToolCall {
                        id,
                        name,
                        arguments,
                    });
                }
            }
            StreamEvent::MessageDelta { delta, usage: u } => {
                if let Some(reason) = delta.stop_reason {
                    finish_reason = Some(from_claude(&reason));
                }
                stop_sequence = delta.stop_sequence;
                if let Some(u) = u {
                    usage.completion_tokens = Some(u.output_tokens);
                }
            }
            StreamEvent::MessageStop | StreamEvent::Ping => {}
            StreamEvent::Error { error } => {
                return Err(TransportError::Api {
                    status: 0,
                    status_text: error.kind,
                    body: error.message,
                    retry_after: None,
                });
            }
        }
        Ok(())
    };

    while let Some(chunk) = next_chunk(&mut response, &ctx.cancellation).await? {
        for event in parser.push_bytes(&chunk) {
            feed(&event.data)?;
        }
    }
    for event in parser.finish() {
        feed(&event.data)?;
    }

    if let Some(total) = usage
        .prompt_tokens
        .zip(usage.completion_tokens)
        .map(|(p, c)| p + c)
    {
        usage.total_tokens = Some(total);
    }

    Ok(NormalizedResponse {
        content: text,
        reasoning_content: if reasoning.is_empty() {
            None
        } else {
            Some(reasoning)
        },
        usage: Some(usage),
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        finish_reason,
        stop_sequence,
        is_stream: true,
    })
}

#[async_trait]
impl ChatAdapter for ClaudeAdapter {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Claude
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
            .unwrap_or(CLAUDE_MESSAGES_ENDPOINT);
        let url = build_claude_url(&ctx.base_url, endpoint);
        let headers = finalize_headers(
            default_headers(&ctx.api_key, request.thinking.enabled),
            &ctx.custom_headers,
        );
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
            let parsed: CreateMessageResponse = serde_json::from_slice(&envelope.body)
                .map_err(|err| TransportError::Parse(err.to_string()))?;
            return Ok(normalize_response(parsed));
        }

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
        let url = build_claude_url(&ctx.base_url, CLAUDE_MODELS_ENDPOINT);
        let headers = finalize_headers(
            default_headers(&ctx.api_key, false),
            &ctx.custom_headers,
        );
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
