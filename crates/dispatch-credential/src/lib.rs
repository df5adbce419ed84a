mod classify;
mod cooldown;
mod credential;
mod events;
mod pool;
mod state;

pub use classify::{BodySignal, FailureClass, FailureSignal};
pub use cooldown::CooldownPolicy;
pub use credential::{ApiKeyCredential, Credential, ServiceAccountCredential};
pub use events::{EventHub, KeyEvent};
pub use pool::{KeyManager, NoKeysConfigured, Selection};
pub use state::{KeyHealth, KeySlot, KeyState, UnavailableReason};
