//! Records the incoming request, applies header override rules, forwards to
//! the configured upstream, and re-emits the response (buffered or
//! streamed) to both its caller and the `InspectorEventHub` subscribers. A
//! single wildcard route, since this proxy has no per-provider routing of
//! its own — it is a dumb forwarder in front of one `target_url`.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use bytes::Bytes;
use dispatch_common::MonotonicIdGen;
use futures_util::StreamExt;
use time::OffsetDateTime;
use tokio::sync::{RwLock, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::config::InspectorConfig;
use crate::events::{InspectorEvent, InspectorEventHub};
use crate::record::{InspectorRequestRecord, InspectorResponseRecord};
use crate::ring::RingBuffer;
use crate::rules::apply_header_overrides;

/// Shared state behind every route: live config, the event fan-out, and the
/// bounded request/response ring buffers.
#[derive(Clone)]
pub struct InspectorState {
    config: Arc<RwLock<InspectorConfig>>,
    hub: Arc<InspectorEventHub>,
    requests: Arc<RwLock<RingBuffer<InspectorRequestRecord>>>,
    responses: Arc<RwLock<RingBuffer<InspectorResponseRecord>>>,
    id_gen: Arc<MonotonicIdGen>,
    client: wreq::Client,
}

impl InspectorState {
    pub fn new(config: InspectorConfig) -> Self {
        let ring_capacity = config.ring_capacity;
        Self {
            config: Arc::new(RwLock::new(config)),
            hub: Arc::new(InspectorEventHub::default()),
            requests: Arc::new(RwLock::new(RingBuffer::new(ring_capacity))),
            responses: Arc::new(RwLock::new(RingBuffer::new(ring_capacity))),
            id_gen: Arc::new(MonotonicIdGen::new()),
            client: wreq::Client::new(),
        }
    }

    pub fn hub(&self) -> Arc<InspectorEventHub> {
        self.hub.clone()
    }

    pub async fn config(&self) -> InspectorConfig {
        self.config.read().await.clone()
    }

    pub async fn set_config(&self, config: InspectorConfig) {
        *self.config.write().await = config;
    }

    pub async fn requests(&self) -> Vec<InspectorRequestRecord> {
        self.requests.read().await.iter().cloned().collect()
    }

    pub async fn responses(&self) -> Vec<InspectorResponseRecord> {
        self.responses.read().await.iter().cloned().collect()
    }
}

/// The whole router is one wildcard fallback: every method, every path,
/// forwarded verbatim to `target_url` with the same path and query.
pub fn inspector_router(state: InspectorState) -> Router {
    Router::new().fallback(any(forward)).with_state(state)
}

async fn forward(
    State(state): State<InspectorState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let id = state.id_gen.next();
    let config = state.config().await;
    if config.target_url.is_empty() {
        return (StatusCode::SERVICE_UNAVAILABLE, "inspector has no target_url configured")
            .into_response();
    }

    let target_base = config.target_url.trim_end_matches('/');
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let url = format!("{target_base}{path_and_query}");

    let mut recorded_headers = BTreeMap::new();
    for (name, value) in headers.iter() {
        if let Ok(v) = value.to_str() {
            recorded_headers.insert(name.as_str().to_string(), v.to_string());
        }
    }

    let request_record = InspectorRequestRecord {
        id,
        method: method.as_str().to_string(),
        url: url.clone(),
        headers: recorded_headers,
        body: body.to_vec(),
        size: body.len(),
        timestamp: OffsetDateTime::now_utc(),
    };
    state.requests.write().await.push(request_record.clone());
    state.hub.emit(InspectorEvent::Request(request_record));
    debug!(id, %url, "inspection proxy recorded request");

    let mut outbound_headers = HeaderMap::new();
    for (name, value) in headers.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        outbound_headers.insert(name.clone(), value.clone());
    }
    apply_header_overrides(&mut outbound_headers, &config.header_override_rules);

    let wreq_method = match wreq::Method::from_bytes(method.as_str().as_bytes()) {
        Ok(m) => m,
        Err(_) => return (StatusCode::BAD_REQUEST, "unsupported method").into_response(),
    };
    let mut outbound = state.client.request(wreq_method, &url);
    for (name, value) in outbound_headers.iter() {
        if let Ok(v) = value.to_str() {
            outbound = outbound.header(name.as_str(), v);
        }
    }
    if !body.is_empty() {
        outbound = outbound.body(body.to_vec());
    }

    let start = Instant::now();
    let upstream = match outbound.send().await {
        Ok(resp) => resp,
        Err(err) => {
            warn!(id, error = %err, "inspection proxy failed to reach target_url");
            return (StatusCode::BAD_GATEWAY, err.to_string()).into_response();
        }
    };

    let status = upstream.status().as_u16();
    let is_sse = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("text/event-stream"))
        .unwrap_or(false);

    let mut response_headers = BTreeMap::new();
    let mut builder =
        Response::builder().status(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY));
    for (name, value) in upstream.headers() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(v) = value.to_str() {
            response_headers.insert(name.as_str().to_string(), v.to_string());
            if let Some(h) = builder.headers_mut()
                && let (Ok(hn), Ok(hv)) = (
                    HeaderName::from_bytes(name.as_str().as_bytes()),
                    HeaderValue::from_str(v),
                )
            {
                h.append(hn, hv);
            }
        }
    }

    if !is_sse {
        let bytes = match upstream.bytes().await {
            Ok(b) => b,
            Err(err) => return (StatusCode::BAD_GATEWAY, err.to_string()).into_response(),
        };
        let response_record = InspectorResponseRecord {
            id,
            status,
            headers: response_headers,
            body: bytes.to_vec(),
            size: bytes.len(),
            duration_ms: start.elapsed().as_millis() as u64,
            timestamp: OffsetDateTime::now_utc(),
        };
        state.responses.write().await.push(response_record.clone());
        state.hub.emit(InspectorEvent::Response(response_record));
        return builder
            .body(Body::from(bytes))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    }

    // Streaming: pipe chunks straight through to the caller while emitting
    // `StreamUpdate` events as they arrive, then publish a pairing
    // `InspectorResponseRecord` of the accumulated body once the upstream
    // stream closes, pairing a request id with its accumulated response.
    let (tx, rx) = mpsc::channel::<Bytes>(32);
    let hub = state.hub.clone();
    let responses = state.responses.clone();
    tokio::spawn(async move {
        let mut stream = upstream.bytes_stream();
        let mut accumulated = Vec::new();
        while let Some(item) = stream.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!(id, error = %err, "inspection proxy stream read failed");
                    break;
                }
            };
            accumulated.extend_from_slice(&chunk);
            let text = String::from_utf8_lossy(&chunk).into_owned();
            hub.emit(InspectorEvent::StreamUpdate {
                id,
                chunk: text,
                is_complete: false,
            });
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
        hub.emit(InspectorEvent::StreamUpdate {
            id,
            chunk: String::new(),
            is_complete: true,
        });
        let response_record = InspectorResponseRecord {
            id,
            status,
            headers: response_headers,
            size: accumulated.len(),
            body: accumulated,
            duration_ms: start.elapsed().as_millis() as u64,
            timestamp: OffsetDateTime::now_utc(),
        };
        responses.write().await.push(response_record.clone());
        hub.emit(InspectorEvent::Response(response_record));
    });

    let body_stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    builder
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_by_hop_headers_are_recognized_case_insensitively() {
        assert!(is_hop_by_hop("Transfer-Encoding"));
        assert!(is_hop_by_hop("host"));
        assert!(!is_hop_by_hop("x-api-key"));
    }
}
