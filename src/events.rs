/// Events reported to the host while a log is being retrieved
use tokio::sync::mpsc;

use crate::models::LogRecord;

/// Per session the sink sees `Connected` at most once, a
/// `DataReceived` per record with an increasing count, and exactly one
/// terminal `Completed` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalEvent {
    Connected,
    DataReceived { count: usize },
    Completed { records: Vec<LogRecord> },
    Failed { reason: String },
}

impl RetrievalEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Receiver of retrieval events, usually a bridge to a UI
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RetrievalEvent);
}

impl EventSink for mpsc::UnboundedSender<RetrievalEvent> {
    fn emit(&self, event: RetrievalEvent) {
        // A dropped receiver means nobody is listening any more
        let _ = self.send(event);
    }
}
