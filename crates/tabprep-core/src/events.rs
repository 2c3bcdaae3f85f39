//! Change notifications for hosts rendering engine state

use serde::{Deserialize, Serialize};

/// Something a host may need to re-render
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Rows or cells changed
    DatasetChanged,
    /// A column's catalog changed
    CatalogChanged { column: String },
    /// A column's variable type changed
    TypeChanged { column: String },
    /// Feature definitions or derived columns changed
    FeaturesChanged,
    /// Undo/redo availability may have changed
    HistoryChanged,
}

/// Pending events in first-emission order, each at most once
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    pending: Vec<EngineEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: EngineEvent) {
        if !self.pending.contains(&event) {
            self.pending.push(event);
        }
    }

    /// Take every pending event
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_queue_dedup_and_drain() {
        let mut queue = EventQueue::new();
        queue.emit(EngineEvent::DatasetChanged);
        queue.emit(EngineEvent::CatalogChanged {
            column: "sex".to_string(),
        });
        queue.emit(EngineEvent::DatasetChanged);

        let events = queue.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], EngineEvent::DatasetChanged);
        assert!(queue.is_empty());
    }
}
