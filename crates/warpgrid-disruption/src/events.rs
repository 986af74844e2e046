//! Observer-facing events about nodes.
//!
//! The disruption core publishes through [`EventRecorder`]; where the events
//! end up (log, API, dashboard) is the host's choice.

use std::sync::{Mutex, PoisonError};

use tracing::{info, warn};

use warpgrid_state::Node;

/// Severity of an event, mirroring the two levels observers filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// A structured notification about one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub node_name: String,
    pub node_uid: String,
    pub kind: EventKind,
    /// Short machine-friendly reason, e.g. "Unconsolidatable".
    pub reason: String,
    pub message: String,
}

impl Event {
    /// Explains why a node was left alone by consolidation.
    pub fn unconsolidatable(node: &Node, reason: &str) -> Self {
        Self {
            node_name: node.name.clone(),
            node_uid: node.uid.clone(),
            kind: EventKind::Normal,
            reason: "Unconsolidatable".to_string(),
            message: reason.to_string(),
        }
    }
}

pub trait EventRecorder: Send + Sync {
    fn publish(&self, event: Event);
}

/// Writes events to the tracing log.
#[derive(Debug, Default)]
pub struct LogRecorder;

impl EventRecorder for LogRecorder {
    fn publish(&self, event: Event) {
        match event.kind {
            EventKind::Normal => info!(
                node = %event.node_name,
                reason = %event.reason,
                detail = %event.message,
                "node event"
            ),
            EventKind::Warning => warn!(
                node = %event.node_name,
                reason = %event.reason,
                detail = %event.message,
                "node event"
            ),
        }
    }
}

/// Keeps published events in memory for later inspection.
#[derive(Debug, Default)]
pub struct BufferedRecorder {
    events: Mutex<Vec<Event>>,
}

impl BufferedRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything published so far, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return everything published so far.
    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventRecorder for BufferedRecorder {
    fn publish(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
