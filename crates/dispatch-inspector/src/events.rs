use tokio::sync::broadcast;

use crate::record::{InspectorRequestRecord, InspectorResponseRecord};

/// The three event streams callers subscribe to
/// (request/response/stream-update), unified into one broadcast channel.
#[derive(Debug, Clone)]
pub enum InspectorEvent {
    Request(InspectorRequestRecord),
    Response(InspectorResponseRecord),
    StreamUpdate {
        id: u64,
        chunk: String,
        is_complete: bool,
    },
}

/// Thin broadcast fan-out, grounded on `dispatch_credential::events::EventHub`.
#[derive(Clone)]
pub struct InspectorEventHub {
    tx: broadcast::Sender<InspectorEvent>,
}

impl InspectorEventHub {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InspectorEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: InspectorEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for InspectorEventHub {
    fn default() -> Self {
        Self::new(256)
    }
}
