//! The local HTTP inspection proxy. Records outbound LLM traffic, applies
//! operator-configured header override rules, and forwards to the real
//! upstream — optionally streaming the response back while fanning out
//! `InspectorEvent`s to any subscriber (the host app's own UI layer, or a
//! test harness).

pub mod config;
pub mod events;
pub mod record;
pub mod ring;
pub mod rules;
pub mod server;

pub use config::InspectorConfig;
pub use events::{InspectorEvent, InspectorEventHub};
pub use record::{InspectorRequestRecord, InspectorResponseRecord};
pub use ring::RingBuffer;
pub use rules::{HeaderOverrideRule, apply_header_overrides};
pub use server::{InspectorState, inspector_router};
