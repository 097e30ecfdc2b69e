//! Progress event emission.
//!
//! The transport layer (SSE, websocket) subscribes with an unbounded channel;
//! when no subscriber is attached, emission is a no-op. Send failures are
//! ignored; a disconnected client must never affect the query.

use meridian_types::{ProgressEvent, ProgressKind};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

/// Cheap-to-clone handle for emitting progress events.
#[derive(Debug, Clone, Default)]
pub struct ProgressEmitter {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressEmitter {
    /// An emitter with no subscriber.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// An emitter feeding the given channel.
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Emit one event, if anyone is listening.
    pub fn emit(&self, kind: ProgressKind, data: Value) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressEvent::new(kind, data));
        }
    }
}
