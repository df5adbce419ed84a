use std::collections::BTreeMap;
use std::sync::Arc;

use dispatch_common::ProfileId;
use dispatch_core::{CooldownPolicy, DispatchError, DispatchRequest, Dispatcher, KeyManager, Profile, ProfileStore};
use dispatch_credential::Credential;
use dispatch_transform::model::{Content, GenerationParams, Message, NormalizedRequest, Role, ThinkingControl};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_request(model: &str) -> NormalizedRequest {
    NormalizedRequest {
        model_id: model.to_string(),
        messages: vec![Message {
            role: Role::User,
            content: Content::Text("hello".to_string()),
        }],
        params: GenerationParams::default(),
        tools: vec![],
        tool_choice: None,
        parallel_tool_calls: None,
        thinking: ThinkingControl::default(),
        extra: Default::default(),
    }
}

fn openai_profile(id: &str, base_url: String, keys: Vec<&str>) -> Profile {
    Profile {
        id: ProfileId::from(id),
        name: "test profile".to_string(),
        provider_type: "openai".to_string(),
        base_url,
        api_keys: keys.into_iter().map(|k| Credential::from(k.to_string())).collect(),
        custom_headers: BTreeMap::new(),
        custom_endpoint: None,
        vertex_publisher: None,
        enabled: true,
        relax_id_certs: false,
        http1_only: false,
        force_proxy: false,
    }
}

async fn dispatcher() -> Dispatcher {
    Dispatcher::new(Arc::new(KeyManager::new(CooldownPolicy::default())))
}

#[tokio::test]
async fn non_streaming_dispatch_round_trips_through_a_real_http_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hi there"},
                "finish_reason": "stop",
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7},
        })))
        .mount(&server)
        .await;

    let store = ProfileStore::new();
    let profile = openai_profile("p1", server.uri(), vec!["sk-test-key"]);
    store.upsert(profile).await;

    let dispatcher = dispatcher().await;
    let mut request = DispatchRequest::new(ProfileId::from("p1"), sample_request("gpt-4o"));
    request.stream = Some(false);

    let response = dispatcher.send_request(&store, request).await.unwrap();
    assert_eq!(response.content, "hi there");
    assert_eq!(response.usage.unwrap().total_tokens, Some(7));
}

#[tokio::test]
async fn rate_limited_key_rotates_to_the_next_key_on_the_following_dispatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "30")
                .set_body_json(serde_json::json!({"error": {"message": "rate_limit exceeded"}})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-2",
            "model": "gpt-4o",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}],
        })))
        .mount(&server)
        .await;

    let store = ProfileStore::new();
    let profile = openai_profile("p1", server.uri(), vec!["sk-key-a", "sk-key-b"]);
    store.upsert(profile).await;

    let dispatcher = dispatcher().await;

    let mut first = DispatchRequest::new(ProfileId::from("p1"), sample_request("gpt-4o"));
    first.stream = Some(false);
    let err = dispatcher.send_request(&store, first).await.unwrap_err();
    assert!(matches!(err, DispatchError::Api { status: 429, .. }));

    let mut second = DispatchRequest::new(ProfileId::from("p1"), sample_request("gpt-4o"));
    second.stream = Some(false);
    let response = dispatcher.send_request(&store, second).await.unwrap();
    assert_eq!(response.content, "ok");
}

#[tokio::test]
async fn dispatch_against_an_unknown_profile_id_is_a_config_error() {
    let store = ProfileStore::new();
    let dispatcher = dispatcher().await;
    let request = DispatchRequest::new(ProfileId::from("missing"), sample_request("gpt-4o"));
    let err = dispatcher.send_request(&store, request).await.unwrap_err();
    assert!(matches!(err, DispatchError::Config(_)));
}

#[tokio::test]
async fn disabled_profile_is_rejected_before_any_network_call() {
    let server = MockServer::start().await;
    let store = ProfileStore::new();
    let mut profile = openai_profile("p1", server.uri(), vec!["sk-test-key"]);
    profile.enabled = false;
    store.upsert(profile).await;

    let dispatcher = dispatcher().await;
    let request = DispatchRequest::new(ProfileId::from("p1"), sample_request("gpt-4o"));
    let err = dispatcher.send_request(&store, request).await.unwrap_err();
    assert!(matches!(err, DispatchError::Config(_)));
}

#[tokio::test]
async fn force_proxy_routes_the_dispatch_through_the_inspection_proxy() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-3",
            "model": "gpt-4o",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "via proxy"}, "finish_reason": "stop"}],
        })))
        .mount(&upstream)
        .await;

    let inspector_config = dispatch_inspector::InspectorConfig {
        port: 0,
        target_url: upstream.uri(),
        header_override_rules: vec![dispatch_inspector::HeaderOverrideRule {
            id: "r1".to_string(),
            enabled: true,
            key: "x-injected".to_string(),
            value: "present".to_string(),
        }],
        ring_capacity: 16,
    };
    let inspector_state = dispatch_inspector::InspectorState::new(inspector_config);
    let mut events = inspector_state.hub().subscribe();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let inspector_addr = listener.local_addr().unwrap();
    let router = dispatch_inspector::inspector_router(inspector_state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    let store = ProfileStore::new();
    let mut profile = openai_profile("p1", "https://this-base-url-is-unused.invalid".to_string(), vec!["sk-test-key"]);
    profile.force_proxy = true;
    store.upsert(profile).await;

    let dispatcher = dispatcher().await;
    dispatcher
        .set_inspector_url(Some(format!("http://{inspector_addr}")))
        .await;

    let mut request = DispatchRequest::new(ProfileId::from("p1"), sample_request("gpt-4o"));
    request.stream = Some(false);
    let response = dispatcher.send_request(&store, request).await.unwrap();
    assert_eq!(response.content, "via proxy");

    let event = tokio::time::timeout(std::time::Duration::from_secs(1), events.recv())
        .await
        .expect("an inspector event should have been emitted")
        .unwrap();
    assert!(matches!(event, dispatch_inspector::InspectorEvent::Request(_)));
}

#[tokio::test]
async fn profile_with_no_keys_is_a_config_error() {
    let server = MockServer::start().await;
    let store = ProfileStore::new();
    store.upsert(openai_profile("p1", server.uri(), vec![])).await;

    let dispatcher = dispatcher().await;
    let request = DispatchRequest::new(ProfileId::from("p1"), sample_request("gpt-4o"));
    let err = dispatcher.send_request(&store, request).await.unwrap_err();
    assert!(matches!(err, DispatchError::Config(_)));
}
