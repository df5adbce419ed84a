use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dispatch_common::ProviderKind;
use dispatch_transform::model::{NormalizedRequest, NormalizedResponse};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::sink::{NullSink, StreamSink};
use crate::transport::Transport;
use crate::url::VertexPublisher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub id: String,
}

/// Everything an adapter needs beyond the normalized request itself. Built
/// by `dispatch-core::Dispatcher` from a resolved `Profile` + the single
/// chosen credential before calling into the adapter: the profile has
/// already been deep-cloned down to one key, and
/// transport flags/`stream`/`timeoutMs` already defaulted.
pub struct DispatchContext {
    pub base_url: String,
    pub api_key: String,
    pub custom_endpoint: Option<String>,
    pub custom_headers: BTreeMap<String, String>,
    pub vertex_publisher: Option<VertexPublisher>,
    pub stream: bool,
    pub timeout: Duration,
    pub cancellation: CancellationToken,
    pub sink: Arc<dyn StreamSink>,
}

impl DispatchContext {
    pub fn non_streaming(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            custom_endpoint: None,
            custom_headers: BTreeMap::new(),
            vertex_publisher: None,
            stream: false,
            timeout: Duration::from_secs(300),
            cancellation: CancellationToken::new(),
            sink: Arc::new(NullSink),
        }
    }
}

/// Vendor defaults plus any profile-configured custom headers, the latter
/// applied last so they override vendor defaults.
pub fn finalize_headers(
    mut headers: BTreeMap<String, String>,
    custom: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    for (key, value) in custom {
        headers.insert(key.clone(), value.clone());
    }
    headers
}

/// Two-phase translator: build (normalized → wire) then execute (send,
/// parse, normalize back).
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    fn provider_kind(&self) -> ProviderKind;

    async fn chat(
        &self,
        transport: &Transport,
        request: &NormalizedRequest,
        ctx: &DispatchContext,
    ) -> Result<NormalizedResponse, TransportError>;

    async fn list_models(
        &self,
        transport: &Transport,
        ctx: &DispatchContext,
    ) -> Result<Vec<ModelDescriptor>, TransportError>;
}
