use dispatch_provider::TransportError;
use thiserror::Error;

/// The error taxonomy the dispatch core surfaces to callers: config
/// problems, credential exhaustion, upstream non-2xx responses, timeouts,
/// aborts, parse failures, and bare network errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("config error: {0}")]
    Config(String),
    #[error("no key available for this profile")]
    NoKeyAvailable,
    #[error("upstream responded {status} {status_text}: {body}")]
    Api {
        status: u16,
        status_text: String,
        body: String,
    },
    #[error("request timed out")]
    Timeout,
    #[error("request aborted: {cause}")]
    Abort { cause: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<TransportError> for DispatchError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Api {
                status,
                status_text,
                body,
                ..
            } => DispatchError::Api {
                status,
                status_text,
                body,
            },
            TransportError::Timeout => DispatchError::Timeout,
            TransportError::Abort { cause } => DispatchError::Abort { cause },
            TransportError::Parse(msg) => DispatchError::Parse(msg),
            TransportError::Network(msg) => DispatchError::Network(msg),
            TransportError::Unsupported(msg) => DispatchError::Unsupported(msg),
        }
    }
}
