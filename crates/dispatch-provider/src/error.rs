use thiserror::Error;

/// Lower-level failure from the transport/adapter layer. `dispatch-core`
/// converts this into its own `DispatchError` at the Dispatcher boundary,
/// attaching the profile/key context the adapter doesn't know about.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("upstream responded {status}: {body}")]
    Api {
        status: u16,
        status_text: String,
        body: String,
        retry_after: Option<u64>,
    },
    #[error("request timed out")]
    Timeout,
    #[error("aborted: {cause}")]
    Abort { cause: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// `Retry-After` (seconds) as captured off the upstream response at the
    /// point the error was raised, when present.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            TransportError::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
