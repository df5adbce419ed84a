//! Cross-crate adapter round trips against a real HTTP server (wiremock),
//! exercising the request-build → transport → response-parse path each
//! colocated unit test suite only covers piecewise.

use std::sync::{Arc, Mutex};

use dispatch_provider::{
    ChatAdapter, ClaudeAdapter, CohereAdapter, DispatchContext, GeminiAdapter, NullSink,
    OpenAiAdapter, OpenAiResponsesAdapter, StreamSink, Transport, TransportConfig, TransportError,
    VertexAdapter, VertexPublisher,
};
use dispatch_transform::model::{
    Content, ContentPart, GenerationParams, Message, NormalizedRequest, Role, ThinkingControl,
    ToolChoice, ToolDefinition,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ctx(base_url: String, stream: bool, sink: Arc<dyn StreamSink>) -> DispatchContext {
    let mut ctx = DispatchContext::non_streaming(base_url, "sk-test-key");
    ctx.stream = stream;
    ctx.sink = sink;
    ctx
}

fn transport() -> Transport {
    Transport::new(&TransportConfig::default()).unwrap()
}

fn request_with_tool(model: &str) -> NormalizedRequest {
    NormalizedRequest {
        model_id: model.to_string(),
        messages: vec![Message {
            role: Role::User,
            content: Content::Parts(vec![
                ContentPart::Text {
                    text: "2+2?".to_string(),
                    cache_control: None,
                },
                ContentPart::Image {
                    data: "iVBORw0KGgo".to_string(),
                    mime: None,
                    cache_control: None,
                },
            ]),
        }],
        params: GenerationParams {
            temperature: Some(0.3),
            max_tokens: Some(100),
            ..Default::default()
        },
        tools: vec![ToolDefinition {
            name: "calculator".to_string(),
            description: Some("adds numbers".to_string()),
            parameters: serde_json::json!({"type": "object"}),
            strict: None,
        }],
        tool_choice: Some(ToolChoice::Auto),
        parallel_tool_calls: None,
        thinking: ThinkingControl::default(),
        extra: Default::default(),
    }
}

/// Records every chunk handed to it, in arrival order, for asserting
/// ordering rather than just the final content.
#[derive(Default)]
struct RecordingSink {
    text: Mutex<Vec<String>>,
}

impl StreamSink for RecordingSink {
    fn on_text(&self, chunk: &str) {
        self.text.lock().unwrap().push(chunk.to_string());
    }
    fn on_reasoning(&self, _chunk: &str) {}
}

#[tokio::test]
async fn claude_streaming_with_tools_round_trips_to_text_and_reports_in_order() {
    let server = MockServer::start().await;
    let sse = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"usage\":{\"input_tokens\":10,\"output_tokens\":0}}}\n\n",
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"4\"}}\n\n",
        "event: content_block_stop\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"input_tokens\":10,\"output_tokens\":1}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-A"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(sse, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let mut dispatch_ctx = ctx(server.uri(), true, sink.clone());
    dispatch_ctx.api_key = "sk-ant-A".to_string();
    let transport = transport();
    let adapter = ClaudeAdapter;

    let response = adapter
        .chat(&transport, &request_with_tool("claude-3-5-sonnet"), &dispatch_ctx)
        .await
        .unwrap();

    assert_eq!(response.content, "4");
    assert!(response.is_stream);
    assert_eq!(sink.text.lock().unwrap().join(""), "4");
}

#[tokio::test]
async fn openai_non_streaming_round_trip_parses_message_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "4"},
                "finish_reason": "stop",
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 1, "total_tokens": 13},
        })))
        .mount(&server)
        .await;

    let dispatch_ctx = ctx(server.uri(), false, Arc::new(NullSink));
    let transport = transport();
    let adapter = OpenAiAdapter;

    let response = adapter
        .chat(&transport, &request_with_tool("gpt-4o"), &dispatch_ctx)
        .await
        .unwrap();

    assert_eq!(response.content, "4");
    assert_eq!(response.usage.unwrap().total_tokens, Some(13));
    assert!(!response.is_stream);
}

#[tokio::test]
async fn gemini_streaming_round_trip_separates_thought_from_content() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Let me think.\",\"thought\":true}]}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"42.\"}]},\"finishReason\":\"STOP\"}],\"usageMetadata\":{\"promptTokenCount\":5,\"candidatesTokenCount\":2,\"totalTokenCount\":7}}\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:streamGenerateContent"))
        .and(header("x-goog-api-key", "sk-test-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(sse, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let dispatch_ctx = ctx(server.uri(), true, sink.clone());
    let transport = transport();
    let adapter = GeminiAdapter;

    let mut request = request_with_tool("gemini-2.0-flash");
    request.thinking.include_thoughts = true;

    let response = adapter.chat(&transport, &request, &dispatch_ctx).await.unwrap();

    assert_eq!(response.content, "42.");
    assert_eq!(response.reasoning_content.as_deref(), Some("Let me think."));
    assert_eq!(sink.text.lock().unwrap().join(""), "42.");
}

#[tokio::test]
async fn cohere_non_streaming_round_trip_parses_message_and_billed_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/chat"))
        .and(header("authorization", "Bearer sk-test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {
                "role": "assistant",
                "content": [{"type": "text", "text": "4"}],
            },
            "finish_reason": "COMPLETE",
            "usage": {"billed_units": {"input_tokens": 9, "output_tokens": 1}},
        })))
        .mount(&server)
        .await;

    let dispatch_ctx = ctx(server.uri(), false, Arc::new(NullSink));
    let transport = transport();
    let adapter = CohereAdapter;

    let response = adapter
        .chat(&transport, &request_with_tool("command-r-plus"), &dispatch_ctx)
        .await
        .unwrap();

    assert_eq!(response.content, "4");
    assert_eq!(response.usage.unwrap().total_tokens, Some(10));
    assert!(!response.is_stream);
}

#[tokio::test]
async fn vertex_anthropic_publisher_round_trip_reuses_claude_wire_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/publishers/anthropic/models/claude-3-5-sonnet:rawPredict"))
        .and(header("authorization", "Bearer sk-test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "msg_1",
            "content": [{"type": "text", "text": "4"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 1},
        })))
        .mount(&server)
        .await;

    let mut dispatch_ctx = ctx(server.uri(), false, Arc::new(NullSink));
    dispatch_ctx.vertex_publisher = Some(VertexPublisher::Anthropic);
    let transport = transport();
    let adapter = VertexAdapter;

    let response = adapter
        .chat(&transport, &request_with_tool("claude-3-5-sonnet"), &dispatch_ctx)
        .await
        .unwrap();

    assert_eq!(response.content, "4");
    assert_eq!(response.usage.unwrap().total_tokens, Some(11));
    assert!(!response.is_stream);
}

#[tokio::test]
async fn openai_responses_non_streaming_round_trip_parses_output_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .and(header("authorization", "Bearer sk-test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "resp_1",
            "output": [{
                "type": "message",
                "content": [{"type": "output_text", "text": "4"}],
            }],
            "usage": {"input_tokens": 10, "output_tokens": 1, "total_tokens": 11},
        })))
        .mount(&server)
        .await;

    let dispatch_ctx = ctx(server.uri(), false, Arc::new(NullSink));
    let transport = transport();
    let adapter = OpenAiResponsesAdapter;

    let response = adapter
        .chat(&transport, &request_with_tool("gpt-4o"), &dispatch_ctx)
        .await
        .unwrap();

    assert_eq!(response.content, "4");
    assert_eq!(response.usage.unwrap().total_tokens, Some(11));
    assert!(!response.is_stream);
}

#[tokio::test]
async fn openai_responses_streaming_request_is_rejected_before_dispatch() {
    // No mock is mounted: a streaming request must fail before it ever
    // reaches the transport, not merely produce an unmatched-request error.
    let server = MockServer::start().await;
    let dispatch_ctx = ctx(server.uri(), true, Arc::new(NullSink));
    let transport = transport();
    let adapter = OpenAiResponsesAdapter;

    let result = adapter
        .chat(&transport, &request_with_tool("gpt-4o"), &dispatch_ctx)
        .await;

    assert!(matches!(result, Err(TransportError::Unsupported(_))));
}
