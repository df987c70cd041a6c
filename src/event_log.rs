//! Event log for conveyor activity
//!
//! Append-only audit trail of everything the conveyor did:
//! - Event: envelope with id + timestamp + kind
//! - EventKind: segment-level and lifecycle-level variants
//! - EventLog: thread-safe, shared by every handle of one conveyor

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scheduler::{Position, SegmentId};

/// Single entry in the conveyor log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since conveyor creation (ms)
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // SEGMENT LEVEL
    // ═══════════════════════════════════════════
    SegmentQueued {
        segment: SegmentId,
        label: Option<Arc<str>>,
        position: Position,
        pending: usize,
    },
    SegmentAttached {
        segment: SegmentId,
    },
    SegmentSettled {
        segment: SegmentId,
        bytes: u64,
        duration_ms: u64,
    },
    SegmentFailed {
        segment: SegmentId,
        error: String,
        /// Queued bindings dropped by the halt
        dropped: usize,
    },

    // ═══════════════════════════════════════════
    // LIFECYCLE LEVEL
    // ═══════════════════════════════════════════
    Paused,
    Resumed,
    EndRequested {
        pending: usize,
    },
    ConveyorEnded {
        settled: u64,
    },
}

impl EventKind {
    /// Extract the segment id if the event is segment-related
    pub fn segment(&self) -> Option<SegmentId> {
        match self {
            Self::SegmentQueued { segment, .. }
            | Self::SegmentAttached { segment }
            | Self::SegmentSettled { segment, .. }
            | Self::SegmentFailed { segment, .. } => Some(*segment),
            Self::Paused
            | Self::Resumed
            | Self::EndRequested { .. }
            | Self::ConveyorEnded { .. } => None,
        }
    }

    pub fn is_lifecycle_event(&self) -> bool {
        self.segment().is_none()
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };

        self.events.write().push(event);
        id
    }

    /// Get all events (cloned)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    pub fn filter_segment(&self, segment: SegmentId) -> Vec<Event> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind.segment() == Some(segment))
            .cloned()
            .collect()
    }

    pub fn lifecycle_events(&self) -> Vec<Event> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind.is_lifecycle_event())
            .cloned()
            .collect()
    }

    /// Count events matching a predicate
    pub fn count(&self, predicate: impl Fn(&EventKind) -> bool) -> usize {
        self.events.read().iter().filter(|e| predicate(&e.kind)).count()
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queued(segment: SegmentId) -> EventKind {
        EventKind::SegmentQueued {
            segment,
            label: Some("part".into()),
            position: Position::Tail,
            pending: 0,
        }
    }

    #[test]
    fn segment_extraction() {
        assert_eq!(queued(3).segment(), Some(3));
        assert_eq!(EventKind::SegmentAttached { segment: 9 }.segment(), Some(9));
        assert_eq!(EventKind::Paused.segment(), None);
        assert!(EventKind::ConveyorEnded { settled: 1 }.is_lifecycle_event());
        assert!(!queued(1).is_lifecycle_event());
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(queued(2)).unwrap();
        assert_eq!(json["type"], "segment_queued");
        assert_eq!(json["segment"], 2);
        assert_eq!(json["label"], "part");
        assert_eq!(json["position"], "tail");
    }

    #[test]
    fn deserializes_from_tagged_json() {
        let json = json!({ "type": "segment_settled", "segment": 4, "bytes": 10, "duration_ms": 1 });
        let kind: EventKind = serde_json::from_value(json).unwrap();
        assert_eq!(
            kind,
            EventKind::SegmentSettled {
                segment: 4,
                bytes: 10,
                duration_ms: 1
            }
        );
    }

    #[test]
    fn emit_returns_monotonic_ids() {
        let log = EventLog::new();
        assert!(log.is_empty());

        assert_eq!(log.emit(queued(1)), 0);
        assert_eq!(log.emit(EventKind::SegmentAttached { segment: 1 }), 1);
        assert_eq!(log.emit(EventKind::Paused), 2);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn filters_by_segment_and_level() {
        let log = EventLog::new();
        log.emit(queued(1));
        log.emit(queued(2));
        log.emit(EventKind::SegmentAttached { segment: 1 });
        log.emit(EventKind::EndRequested { pending: 1 });

        assert_eq!(log.filter_segment(1).len(), 2);
        assert_eq!(log.filter_segment(2).len(), 1);
        assert_eq!(log.lifecycle_events().len(), 1);
        assert_eq!(
            log.count(|k| matches!(k, EventKind::SegmentQueued { .. })),
            2
        );
    }

    #[test]
    fn clones_share_storage() {
        let log = EventLog::new();
        let cloned = log.clone();
        log.emit(EventKind::Resumed);
        assert_eq!(cloned.len(), 1);
    }

    #[test]
    fn to_json_is_array() {
        let log = EventLog::new();
        log.emit(EventKind::ConveyorEnded { settled: 2 });

        let json = log.to_json();
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["kind"]["type"], "conveyor_ended");
    }

    #[test]
    fn concurrent_emits_get_unique_ids() {
        let log = EventLog::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                std::thread::spawn(move || log.emit(EventKind::SegmentAttached { segment: i }))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut ids: Vec<u64> = log.events().iter().map(|e| e.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }
}
