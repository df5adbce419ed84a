use std::time::SystemTime;

use dispatch_common::ProfileId;
use tokio::sync::broadcast;

use crate::state::{KeySlot, UnavailableReason};

/// Operational events the Key Manager emits, independent of any UI — the
/// rest of the app subscribes to learn
/// about credential health transitions without polling.
#[derive(Debug, Clone)]
pub enum KeyEvent {
    UnavailableStart {
        at: SystemTime,
        profile_id: ProfileId,
        slot: KeySlot,
        reason: UnavailableReason,
        until: SystemTime,
    },
    UnavailableEnd {
        at: SystemTime,
        profile_id: ProfileId,
        slot: KeySlot,
    },
}

/// Thin broadcast fan-out. No persistence layer sits behind it: key health
/// is explicitly in-memory-only and never survives a process restart.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<KeyEvent>,
}

impl EventHub {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KeyEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: KeyEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}
