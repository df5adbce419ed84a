//! The Dispatcher: resolves a profile, picks a key, hands off to the
//! matching provider adapter, and reports health back before the result
//! reaches the caller. A direct library call rather than an HTTP front end,
//! since it receives an already-normalized request, not raw provider wire
//! bytes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dispatch_common::{ProfileId, ProviderKind};
use dispatch_credential::{FailureSignal, KeyManager};
use dispatch_provider::{
    ChatAdapter, ClaudeAdapter, CohereAdapter, DispatchContext, GeminiAdapter, ModelDescriptor,
    NullSink, OpenAiAdapter, OpenAiResponsesAdapter, ProxyConfig, StreamSink, Transport,
    TransportConfig, VertexAdapter, VertexPublisher,
};
use dispatch_transform::model::{NormalizedRequest, NormalizedResponse};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::profile::{Profile, ProfileStore};

const DEFAULT_TIMEOUT_MS: u64 = 300_000;

/// The caller-facing request shape: the normalized request in full,
/// including the fields `dispatch-transform::NormalizedRequest` deliberately
/// omits (profile id, streaming callbacks, abort signal, timeout, transport
/// flag overrides) since those belong to this orchestration layer, not the
/// provider-translation layer.
pub struct DispatchRequest {
    pub profile_id: ProfileId,
    pub inner: NormalizedRequest,
    pub stream: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub cancellation: Option<CancellationToken>,
    pub sink: Option<Arc<dyn StreamSink>>,
    /// Forces routing through the proxy configuration even when the profile
    /// itself doesn't request it.
    pub force_proxy: bool,
    pub relax_id_certs: Option<bool>,
    pub http1_only: Option<bool>,
}

impl DispatchRequest {
    pub fn new(profile_id: ProfileId, inner: NormalizedRequest) -> Self {
        Self {
            profile_id,
            inner,
            stream: None,
            timeout_ms: None,
            cancellation: None,
            sink: None,
            force_proxy: false,
            relax_id_certs: None,
            http1_only: None,
        }
    }
}

fn adapter_for(kind: ProviderKind) -> &'static dyn ChatAdapter {
    static OPENAI: OpenAiAdapter = OpenAiAdapter;
    static OPENAI_RESPONSES: OpenAiResponsesAdapter = OpenAiResponsesAdapter;
    static CLAUDE: ClaudeAdapter = ClaudeAdapter;
    static GEMINI: GeminiAdapter = GeminiAdapter;
    static VERTEX: VertexAdapter = VertexAdapter;
    static COHERE: CohereAdapter = CohereAdapter;

    match kind {
        ProviderKind::OpenAI => &OPENAI,
        ProviderKind::OpenAIResponses => &OPENAI_RESPONSES,
        ProviderKind::Claude => &CLAUDE,
        ProviderKind::Gemini => &GEMINI,
        ProviderKind::Vertex => &VERTEX,
        ProviderKind::Cohere => &COHERE,
    }
}

/// Turns a failed dispatch into the signal the Key Manager classifies.
/// `cancelled` distinguishes a caller-initiated abort (never penalized) from
/// every other transport failure.
fn failure_signal(err: &dispatch_provider::TransportError, cancelled: bool) -> FailureSignal {
    use dispatch_credential::BodySignal;
    use dispatch_provider::TransportError;

    if cancelled {
        return FailureSignal {
            is_user_abort: true,
            ..Default::default()
        };
    }

    match err {
        TransportError::Api {
            status,
            body,
            retry_after,
            ..
        } => FailureSignal {
            status: Some(*status),
            body_signal: body_signal_from(body),
            retry_after: retry_after.map(Duration::from_secs),
            ..Default::default()
        },
        TransportError::Timeout => FailureSignal {
            is_timeout: true,
            ..Default::default()
        },
        TransportError::Abort { .. } => FailureSignal {
            is_user_abort: true,
            ..Default::default()
        },
        TransportError::Network(_) => FailureSignal {
            is_network_error: true,
            ..Default::default()
        },
        TransportError::Parse(_) => FailureSignal::default(),
        TransportError::Unsupported(_) => FailureSignal::default(),
    }
}

fn body_signal_from(body: &str) -> Option<dispatch_credential::BodySignal> {
    use dispatch_credential::BodySignal;
    let lower = body.to_ascii_lowercase();
    if lower.contains("invalid_api_key") || lower.contains("invalid api key") {
        Some(BodySignal::InvalidApiKey)
    } else if lower.contains("rate_limit") || lower.contains("rate limit") {
        Some(BodySignal::RateLimit)
    } else {
        None
    }
}

/// Orchestrates profile resolution, key selection, adapter dispatch and
/// health reporting. One `Dispatcher` is shared across every request; it
/// caches one `Transport` per profile rather than building a fresh HTTP
/// client on each call.
pub struct Dispatcher {
    key_manager: Arc<KeyManager>,
    transports: RwLock<HashMap<(ProfileId, bool, bool), Arc<Transport>>>,
    /// Base URL of the local inspection proxy, when the host app has one
    /// running. `None` means `forceProxy` has nowhere to route to, so it is
    /// ignored with a warning rather than failing the dispatch. Distinct
    /// from `dispatch_provider::ProxyConfig`, which is the Transport's own
    /// generic egress-proxy knob — this specifically redirects outbound
    /// traffic to the local inspection proxy.
    inspector_url: RwLock<Option<String>>,
}

impl Dispatcher {
    pub fn new(key_manager: Arc<KeyManager>) -> Self {
        Self {
            key_manager,
            transports: RwLock::new(HashMap::new()),
            inspector_url: RwLock::new(None),
        }
    }

    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.key_manager
    }

    /// Points every future `forceProxy` dispatch at this inspection-proxy
    /// base URL (e.g. `http://127.0.0.1:16655`). Pass `None` to stop routing
    /// through it.
    pub async fn set_inspector_url(&self, url: Option<String>) {
        *self.inspector_url.write().await = url;
    }

    /// Caches one `Transport` per `(profile, relax_id_certs, http1_only)`
    /// combination: a request overriding either flag away from the
    /// profile's own default needs a client built with different TLS/HTTP
    /// settings, so the cache key has to include the effective flags, not
    /// just the profile id.
    async fn transport_for(
        &self,
        profile: &Profile,
        relax_id_certs: bool,
        http1_only: bool,
    ) -> Result<Arc<Transport>, DispatchError> {
        let key = (profile.id.clone(), relax_id_certs, http1_only);
        if let Some(existing) = self.transports.read().await.get(&key) {
            return Ok(existing.clone());
        }
        let mut guard = self.transports.write().await;
        if let Some(existing) = guard.get(&key) {
            return Ok(existing.clone());
        }
        let config = TransportConfig {
            proxy: ProxyConfig::None,
            relax_id_certs,
            http1_only,
        };
        let transport = Arc::new(
            Transport::new(&config).map_err(|err| DispatchError::Network(err.to_string()))?,
        );
        guard.insert(key, transport.clone());
        Ok(transport)
    }

    /// Resolves the base URL an adapter should actually build its request
    /// against: the inspection proxy's address when `forceProxy` is in
    /// effect and one is configured, the profile's own `base_url`
    /// otherwise. The proxy learns the *real* upstream from its own
    /// target-url configuration, so redirecting here is just a matter of
    /// swapping the host the adapter talks to.
    async fn effective_base_url(&self, profile: &Profile, use_proxy: bool) -> String {
        if !use_proxy {
            return profile.base_url.clone();
        }
        match self.inspector_url.read().await.clone() {
            Some(url) => url,
            None => {
                warn!(
                    profile_id = %profile.id,
                    "forceProxy requested but no inspection proxy is configured; dispatching directly"
                );
                profile.base_url.clone()
            }
        }
    }

    /// `sendRequest(normalizedRequest) -> NormalizedResponse`: the
    /// Dispatcher's sole operation.
    pub async fn send_request(
        &self,
        store: &ProfileStore,
        request: DispatchRequest,
    ) -> Result<NormalizedResponse, DispatchError> {
        let profile = store
            .get(&request.profile_id)
            .await
            .ok_or_else(|| DispatchError::Config(format!("profile {} not found", request.profile_id)))?;

        if !profile.enabled {
            return Err(DispatchError::Config(format!(
                "profile {} is disabled",
                profile.id
            )));
        }
        if profile.api_keys.is_empty() {
            return Err(DispatchError::Config(format!(
                "profile {} has no keys configured",
                profile.id
            )));
        }

        let selection = self
            .key_manager
            .pick_key(&profile.id, profile.api_keys.len())
            .await
            .map_err(|_| DispatchError::NoKeyAvailable)?;
        if selection.all_impaired {
            warn!(profile_id = %profile.id, "dispatching with an impaired key; every key is cooling down");
        }
        let credential = &profile.api_keys[selection.slot];

        let kind = profile.provider_kind();
        // Request-level transport flags override the profile default only
        // when the request actually sets them.
        let use_proxy = request.force_proxy || profile.force_proxy;
        let relax_id_certs = request.relax_id_certs.unwrap_or(profile.relax_id_certs);
        let http1_only = request.http1_only.unwrap_or(profile.http1_only);
        let transport = self
            .transport_for(&profile, relax_id_certs, http1_only)
            .await?;
        let base_url = self.effective_base_url(&profile, use_proxy).await;

        let ctx = DispatchContext {
            base_url,
            api_key: credential.as_wire_secret().to_string(),
            custom_endpoint: profile.custom_endpoint.clone(),
            custom_headers: profile.custom_headers.clone(),
            vertex_publisher: resolve_vertex_publisher(&profile, kind),
            stream: request.stream.unwrap_or(true),
            timeout: Duration::from_millis(request.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
            cancellation: request.cancellation.clone().unwrap_or_default(),
            sink: request.sink.clone().unwrap_or_else(|| Arc::new(NullSink)),
        };

        info!(
            profile_id = %profile.id,
            provider = %kind,
            slot = selection.slot,
            model = %request.inner.model_id,
            "dispatching request"
        );

        let adapter = adapter_for(kind);
        let result = adapter.chat(&transport, &request.inner, &ctx).await;

        match result {
            Ok(response) => {
                self.key_manager
                    .report_success(&profile.id, selection.slot)
                    .await;
                Ok(response)
            }
            Err(err) => {
                let signal = failure_signal(&err, ctx.cancellation.is_cancelled());
                self.key_manager
                    .report_failure(&profile.id, selection.slot, &signal)
                    .await;
                Err(DispatchError::from(err))
            }
        }
    }

    /// `fetchModelsFromApi(Profile) -> ModelDescriptor[]`: one GET against
    /// the provider's models endpoint, informational only — it neither
    /// consults nor updates key health the way `send_request` does, since a
    /// models listing is not a billable/rate-limited chat dispatch in most
    /// providers' terms of service.
    pub async fn fetch_models(&self, profile: &Profile) -> Result<Vec<ModelDescriptor>, DispatchError> {
        let Some(credential) = profile.api_keys.first() else {
            return Err(DispatchError::Config(format!(
                "profile {} has no keys configured",
                profile.id
            )));
        };
        let kind = profile.provider_kind();
        let transport = self
            .transport_for(profile, profile.relax_id_certs, profile.http1_only)
            .await?;
        let base_url = self.effective_base_url(profile, profile.force_proxy).await;
        let mut ctx = DispatchContext::non_streaming(base_url, credential.as_wire_secret());
        ctx.custom_headers = profile.custom_headers.clone();
        ctx.vertex_publisher = resolve_vertex_publisher(profile, kind);
        let adapter = adapter_for(kind);
        Ok(adapter.list_models(&transport, &ctx).await?)
    }
}

fn resolve_vertex_publisher(profile: &Profile, kind: ProviderKind) -> Option<VertexPublisher> {
    if kind != ProviderKind::Vertex {
        return None;
    }
    Some(profile.vertex_publisher().unwrap_or(VertexPublisher::Google))
}
