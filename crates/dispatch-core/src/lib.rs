//! The Dispatcher crate: profile storage, key selection and adapter dispatch
//! tied together behind a single `send_request` entry point. Thin by design —
//! the heavy lifting (wire translation, SSE parsing, key rotation/cooldown)
//! lives in `dispatch-transform`, `dispatch-provider` and
//! `dispatch-credential`; this crate only orchestrates them.

pub mod dispatcher;
pub mod error;
pub mod profile;

pub use dispatcher::{DispatchRequest, Dispatcher};
pub use error::DispatchError;
pub use profile::{Profile, ProfileStore};

pub use dispatch_credential::{CooldownPolicy, FailureSignal, KeyManager};
