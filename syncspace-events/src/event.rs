//! Event and filter types

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// The event type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    DocumentCreated,
    DocumentUpdated,
    DocumentDeleted,
    SpaceCreated,
    SpaceDeleted,
    SyncStarted,
    SyncCompleted,
    SyncError,
    SyncConflict,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DocumentCreated => "document.created",
            EventType::DocumentUpdated => "document.updated",
            EventType::DocumentDeleted => "document.deleted",
            EventType::SpaceCreated => "space.created",
            EventType::SpaceDeleted => "space.deleted",
            EventType::SyncStarted => "sync.started",
            EventType::SyncCompleted => "sync.completed",
            EventType::SyncError => "sync.error",
            EventType::SyncConflict => "sync.conflict",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unrecognized event type strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document.created" => Ok(EventType::DocumentCreated),
            "document.updated" => Ok(EventType::DocumentUpdated),
            "document.deleted" => Ok(EventType::DocumentDeleted),
            "space.created" => Ok(EventType::SpaceCreated),
            "space.deleted" => Ok(EventType::SpaceDeleted),
            "sync.started" => Ok(EventType::SyncStarted),
            "sync.completed" => Ok(EventType::SyncCompleted),
            "sync.error" => Ok(EventType::SyncError),
            "sync.conflict" => Ok(EventType::SyncConflict),
            _ => Err(UnknownEventType(s.to_string())),
        }
    }
}

/// A single event delivered to subscribers.
#[derive(Debug, Clone)]
pub struct Event {
    /// Unique event id.
    pub id: String,
    pub event_type: EventType,
    pub space_id: String,
    /// Unix seconds at emission.
    pub timestamp: i64,
    pub payload: HashMap<String, String>,
}

/// Subscription filter. An empty set in a dimension matches anything on
/// that dimension.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub types: HashSet<EventType>,
    pub space_ids: HashSet<String>,
}

impl EventFilter {
    /// Match-all filter.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn matches(&self, event: &Event) -> bool {
        if !self.types.is_empty() && !self.types.contains(&event.event_type) {
            return false;
        }
        if !self.space_ids.is_empty() && !self.space_ids.contains(&event.space_id) {
            return false;
        }
        true
    }
}
