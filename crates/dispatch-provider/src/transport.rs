use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TransportError;

/// Outbound proxy selection for a dispatch.
#[derive(Debug, Clone, Default)]
pub enum ProxyConfig {
    #[default]
    None,
    System,
    Custom(String),
}

/// The per-profile transport knobs a profile's transport flags describe:
/// proxy routing and TLS/HTTP version relaxation.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    pub proxy: ProxyConfig,
    pub relax_id_certs: bool,
    pub http1_only: bool,
}

/// A fully read, non-streaming HTTP response.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub body: bytes::Bytes,
}

/// Thin wrapper over `wreq::Client` (a `reqwest`-API-compatible client)
/// providing the timeout/abort/proxy/TLS wiring a dispatch needs. Owns one
/// client per `Transport` instance rather than a process-wide cache keyed
/// by proxy string — the Dispatcher already caches one `Transport` per
/// profile, so a second cache layer underneath it would be redundant.
pub struct Transport {
    client: wreq::Client,
}

impl Transport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let mut builder = wreq::Client::builder();
        match &config.proxy {
            ProxyConfig::None => {
                builder = builder.no_proxy();
            }
            ProxyConfig::System => {}
            ProxyConfig::Custom(url) => {
                let proxy =
                    wreq::Proxy::all(url).map_err(|err| TransportError::Network(err.to_string()))?;
                builder = builder.proxy(proxy);
            }
        }
        if config.relax_id_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if config.http1_only {
            builder = builder.http1_only();
        }
        let client = builder
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self { client })
    }

    /// Sends one request and reads the full response body, honoring
    /// `timeout` and `cancellation` (the external abort signal bridge).
    pub async fn send_json(
        &self,
        method: wreq::Method,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&Value>,
        timeout: Duration,
        cancellation: &CancellationToken,
    ) -> Result<ResponseEnvelope, TransportError> {
        let response = self
            .dispatch(method, url, headers, body, timeout, cancellation)
            .await?;
        let status = response.status().as_u16();
        let retry_after = retry_after_seconds(&response);
        let bytes = response
            .bytes()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        if !(200..300).contains(&status) {
            let body_text = String::from_utf8_lossy(&bytes).into_owned();
            return Err(TransportError::Api {
                status,
                status_text: status_text(status),
                body: body_text,
                retry_after,
            });
        }
        Ok(ResponseEnvelope {
            status,
            body: bytes,
        })
    }

    /// Opens a streaming request and hands back the raw response once
    /// headers arrive and the status has been checked; the caller drives
    /// the SSE parser over `response.chunk()` itself so it can interleave
    /// abort checks with each read.
    pub async fn open_stream(
        &self,
        method: wreq::Method,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&Value>,
        timeout: Duration,
        cancellation: &CancellationToken,
    ) -> Result<wreq::Response, TransportError> {
        let response = self
            .dispatch(method, url, headers, body, timeout, cancellation)
            .await?;
        let status = response.status().as_u16();
        let retry_after = retry_after_seconds(&response);
        if !(200..300).contains(&status) {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::new());
            return Err(TransportError::Api {
                status,
                status_text: status_text(status),
                body: body_text,
                retry_after,
            });
        }
        Ok(response)
    }

    async fn dispatch(
        &self,
        method: wreq::Method,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&Value>,
        timeout: Duration,
        cancellation: &CancellationToken,
    ) -> Result<wreq::Response, TransportError> {
        let mut request = self.client.request(method, url);
        for (key, value) in headers {
            request = request.header(key, value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(url, "sending upstream request");

        tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(TransportError::Abort {
                cause: "caller aborted".to_string(),
            }),
            result = tokio::time::timeout(timeout, request.send()) => match result {
                Err(_) => Err(TransportError::Timeout),
                Ok(Err(err)) => Err(classify_send_error(&err)),
                Ok(Ok(response)) => Ok(response),
            },
        }
    }
}

fn classify_send_error(err: &wreq::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

fn retry_after_seconds(response: &wreq::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn status_text(status: u16) -> String {
    wreq::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("unknown status")
        .to_string()
}

/// Reads the next chunk of a streaming response, racing it against the
/// cancellation token so a mid-stream abort tears the reader down promptly
/// so a mid-stream abort is noticed between chunks, not just at send time.
pub async fn next_chunk(
    response: &mut wreq::Response,
    cancellation: &CancellationToken,
) -> Result<Option<bytes::Bytes>, TransportError> {
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(TransportError::Abort {
            cause: "caller aborted".to_string(),
        }),
        chunk = response.chunk() => chunk.map_err(|err| TransportError::Network(err.to_string())),
    }
}
