use async_trait::async_trait;
use dispatch_common::ProviderKind;
use dispatch_protocol::openai::responses::{
    CreateResponseRequest, OutputContentPart, OutputItem, ResponseInput, ResponseObject,
};
use dispatch_protocol::openai::ModelsListResponse;
use dispatch_transform::model::{Content, NormalizedRequest, NormalizedResponse, Usage};
use dispatch_transform::{apply_custom_parameters, clean_payload};
use serde_json::Value;

use crate::adapter::{finalize_headers, ChatAdapter, DispatchContext, ModelDescriptor};
use crate::error::TransportError;
use crate::transport::Transport;
use crate::url::{build_openai_url, OPENAI_MODELS_ENDPOINT, OPENAI_RESPONSES_ENDPOINT};
use crate::util::{object_to_value, value_to_object};

/// A stateful, single-input variant of OpenAI Chat Completions. Only the
/// non-streaming surface is implemented: the Responses API's event stream
/// (`response.output_text.delta`, …) is a distinct wire shape Chat
/// Completions' SSE chunk format doesn't model. A caller requesting
/// streaming gets an explicit `TransportError::Unsupported` rather than a
/// silent downgrade to a single non-streamed reply.
pub struct OpenAiResponsesAdapter;

fn flatten_to_single_text(request: &NormalizedRequest) -> (ResponseInput, Option<String>) {
    let mut instructions: Vec<String> = Vec::new();
    let mut turns: Vec<String> = Vec::new();
    for message in &request.messages {
        let text = match &message.content {
            Content::Text(text) => text.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    dispatch_transform::model::ContentPart::Text { text, .. } => {
                        Some(text.as_str())
                    }
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        };
        match message.role {
            dispatch_transform::model::Role::System => instructions.push(text),
            _ => turns.push(text),
        }
    }
    let instructions = if instructions.is_empty() {
        None
    } else {
        Some(instructions.join("\n\n"))
    };
    (ResponseInput::Text(turns.join("\n")), instructions)
}

fn build_body(request: &NormalizedRequest) -> Value {
    let (input, instructions) = flatten_to_single_text(request);
    let previous_response_id = request
        .extra
        .get("previous_response_id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let wire = CreateResponseRequest {
        model: request.model_id.clone(),
        input,
        previous_response_id,
        instructions,
        temperature: request.params.temperature,
        top_p: request.params.top_p,
        max_output_tokens: request.params.max_tokens,
        stream: Some(false),
        extra: Default::default(),
    };

    let mut body = value_to_object(serde_json::to_value(&wire).expect("wire request serializes"));
    apply_custom_parameters(&mut body, &request.extra);
    clean_payload(&mut body);
    object_to_value(body)
}

fn normalize_response(response: ResponseObject) -> NormalizedResponse {
    let mut content = String::new();
    let mut reasoning = String::new();
    for item in response.output {
        if let OutputItem::Message { content: parts } = item {
            for part in parts {
                match part {
                    OutputContentPart::OutputText { text } => content.push_str(&text),
                    OutputContentPart::Reasoning { text } => reasoning.push_str(&text),
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
        usage: response.usage.map(|u| Usage {
            prompt_tokens: Some(u.input_tokens),
            completion_tokens: Some(u.output_tokens),
            total_tokens: Some(u.total_tokens),
        }),
        tool_calls: None,
        finish_reason: None,
        stop_sequence: None,
        is_stream: false,
    }
}

#[async_trait]
impl ChatAdapter for OpenAiResponsesAdapter {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::OpenAIResponses
    }

    async fn chat(
        &self,
        transport: &Transport,
        request: &NormalizedRequest,
        ctx: &DispatchContext,
    ) -> Result<NormalizedResponse, TransportError> {
        if ctx.stream {
            return Err(TransportError::Unsupported(
                "openai responses adapter does not implement event-stream output; dispatch with stream=false".to_string(),
            ));
        }

        let endpoint = ctx
            .custom_endpoint
            .as_deref()
            .unwrap_or(OPENAI_RESPONSES_ENDPOINT);
        let url = build_openai_url(&ctx.base_url, endpoint);
        let mut headers = std::collections::BTreeMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", ctx.api_key));
        let headers = finalize_headers(headers, &ctx.custom_headers);
        let body = build_body(request);

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
        let parsed: ResponseObject = serde_json::from_slice(&envelope.body)
            .map_err(|err| TransportError::Parse(err.to_string()))?;
        let normalized = normalize_response(parsed);
        if !normalized.content.is_empty() {
            ctx.sink.on_text(&normalized.content);
        }
        Ok(normalized)
    }

    async fn list_models(
        &self,
        transport: &Transport,
        ctx: &DispatchContext,
    ) -> Result<Vec<ModelDescriptor>, TransportError> {
        let url = build_openai_url(&ctx.base_url, OPENAI_MODELS_ENDPOINT);
        let mut headers = std::collections::BTreeMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", ctx.api_key));
        let headers = finalize_headers(headers, &ctx.custom_headers);
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

