use super::clock::Clock;
use crate::membership::types::{Address, Timestamp};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Receives one call per logical membership decision taken by a node.
pub trait EventLog: Send + Sync {
    fn node_added(&self, observer: Address, subject: Address);
    fn node_removed(&self, observer: Address, subject: Address);
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Added,
    Removed,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MembershipEvent {
    pub at: Timestamp,
    pub observer: Address,
    pub subject: Address,
    pub kind: EventKind,
}

/// Writes membership decisions to the `tracing` pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn node_added(&self, observer: Address, subject: Address) {
        tracing::info!(%observer, %subject, "node added");
    }

    fn node_removed(&self, observer: Address, subject: Address) {
        tracing::info!(%observer, %subject, "node removed");
    }
}

/// Keeps every decision in memory, stamped with the clock.
pub struct RecordingEventLog {
    clock: Arc<dyn Clock>,
    events: Mutex<Vec<MembershipEvent>>,
    echo: bool,
}

impl RecordingEventLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            events: Mutex::new(Vec::new()),
            echo: false,
        }
    }

    /// Also forward each event to [`TracingEventLog`].
    pub fn with_tracing(mut self) -> Self {
        self.echo = true;
        self
    }

    fn record(&self, observer: Address, subject: Address, kind: EventKind) {
        let event = MembershipEvent {
            at: self.clock.now(),
            observer,
            subject,
            kind,
        };
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<MembershipEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    /// Events of `kind` that `observer` recorded about `subject`.
    pub fn count_between(&self, observer: Address, subject: Address, kind: EventKind) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind && e.observer == observer && e.subject == subject)
            .count()
    }
}

impl EventLog for RecordingEventLog {
    fn node_added(&self, observer: Address, subject: Address) {
        if self.echo {
            TracingEventLog.node_added(observer, subject);
        }
        self.record(observer, subject, EventKind::Added);
    }

    fn node_removed(&self, observer: Address, subject: Address) {
        if self.echo {
            TracingEventLog.node_removed(observer, subject);
        }
        self.record(observer, subject, EventKind::Removed);
    }
}
