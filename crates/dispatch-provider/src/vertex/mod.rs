//! Vertex AI: one provider type fronting two distinct publisher wire
//! shapes. `DispatchContext::vertex_publisher` selects which: `Google`
//! reuses the Gemini `GenerateContentRequest`/`GenerateContentResponse`
//! shape verbatim (`crate::gemini`); `Anthropic` reuses the Claude
//! `CreateMessageRequest` shape with `model` dropped (it's already in the
//! URL) and `anthropic_version` added in its place (`crate::claude`).
//! Defaults to `Google` when unset, since Gemini-on-Vertex is this
//! provider's native model family.

use async_trait::async_trait;
use dispatch_common::ProviderKind;
use dispatch_protocol::claude::CreateMessageResponse;
use dispatch_protocol::gemini::GenerateContentResponse;

use crate::adapter::{finalize_headers, ChatAdapter, DispatchContext, ModelDescriptor};
use crate::claude;
use crate::error::TransportError;
use crate::gemini;
use crate::transport::Transport;
use crate::url::{build_vertex_url, VertexOperation, VertexPublisher};
use dispatch_transform::model::{NormalizedRequest, NormalizedResponse};

pub struct VertexAdapter;

fn publisher(ctx: &DispatchContext) -> VertexPublisher {
    ctx.vertex_publisher.unwrap_or(VertexPublisher::Google)
}

fn default_headers(api_key: &str) -> std::collections::BTreeMap<String, String> {
    let mut headers = std::collections::BTreeMap::new();
    headers.insert("Authorization".to_string(), format!("Bearer {api_key}"));
    headers
}

#[async_trait]
impl ChatAdapter for VertexAdapter {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Vertex
    }

    async fn chat(
        &self,
        transport: &Transport,
        request: &NormalizedRequest,
        ctx: &DispatchContext,
    ) -> Result<NormalizedResponse, TransportError> {
        let headers = finalize_headers(default_headers(&ctx.api_key), &ctx.custom_headers);

        match publisher(ctx) {
            VertexPublisher::Google => {
                let operation = if ctx.stream {
                    VertexOperation::StreamGenerateContent
                } else {
                    VertexOperation::GenerateContent
                };
                let url = build_vertex_url(
                    &ctx.base_url,
                    VertexPublisher::Google,
                    &request.model_id,
                    operation,
                );
                let body = gemini::build_body(request);

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
                    return Ok(gemini::normalize_candidate(parsed));
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
                gemini::parse_stream(response, ctx).await
            }
            VertexPublisher::Anthropic => {
                let operation = if ctx.stream {
                    VertexOperation::StreamRawPredict
                } else {
                    VertexOperation::RawPredict
                };
                let url = build_vertex_url(
                    &ctx.base_url,
                    VertexPublisher::Anthropic,
                    &request.model_id,
                    operation,
                );
                let body = claude::build_vertex_body(request, ctx.stream);

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
                    return Ok(claude::normalize_response(parsed));
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
                claude::parse_stream(response, ctx).await
            }
        }
    }

    /// Vertex AI has no single cross-publisher models-list endpoint the way
    /// the five direct providers do; model availability there is governed
    /// by what's deployed to the project/region, discovered out of band.
    async fn list_models(
        &self,
        _transport: &Transport,
        _ctx: &DispatchContext,
    ) -> Result<Vec<ModelDescriptor>, TransportError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::build_vertex_url;

    #[test]
    fn google_publisher_is_the_default_when_unset() {
        let ctx = DispatchContext::non_streaming("https://example.com", "token");
        assert_eq!(publisher(&ctx), VertexPublisher::Google);
    }

    #[test]
    fn anthropic_publisher_uses_raw_predict_operation_naming() {
        let url = build_vertex_url(
            "https://us-central1-aiplatform.googleapis.com",
            VertexPublisher::Anthropic,
            "claude-3-5-sonnet",
            VertexOperation::StreamRawPredict,
        );
        assert!(url.ends_with(":streamRawPredict"));
    }
}
