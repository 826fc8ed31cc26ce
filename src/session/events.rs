//! Session Events
//!
//! Change notifications broadcast after each successful coordinator mutation.

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use tokio::sync::broadcast;

/// Events that can be emitted for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// Session and owner created together
    #[serde(rename_all = "camelCase")]
    Created {
        session_id: String,
        owner_id: String,
    },

    #[serde(rename_all = "camelCase")]
    MemberJoined {
        session_id: String,
        member_id: String,
    },

    /// Member removed themselves
    #[serde(rename_all = "camelCase")]
    MemberLeft {
        session_id: String,
        member_id: String,
    },

    /// Owner removed a member
    #[serde(rename_all = "camelCase")]
    MemberRemoved {
        session_id: String,
        member_id: String,
    },

    #[serde(rename_all = "camelCase")]
    Started { session_id: String },

    #[serde(rename_all = "camelCase")]
    Ended { session_id: String },

    /// Session deleted, members cascaded
    #[serde(rename_all = "camelCase")]
    Deleted {
        session_id: String,
        members_deleted: usize,
        skipped: usize,
    },
}

impl SessionEvent {
    /// Get the session ID from any event
    pub fn session_id(&self) -> &str {
        match self {
            Self::Created { session_id, .. } => session_id,
            Self::MemberJoined { session_id, .. } => session_id,
            Self::MemberLeft { session_id, .. } => session_id,
            Self::MemberRemoved { session_id, .. } => session_id,
            Self::Started { session_id } => session_id,
            Self::Ended { session_id } => session_id,
            Self::Deleted { session_id, .. } => session_id,
        }
    }

    /// Scoped event name, e.g. `session-started:s1`
    pub fn event_name(&self) -> String {
        format!("{}:{}", self.global_event_name(), self.session_id())
    }

    pub fn global_event_name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "session-created",
            Self::MemberJoined { .. } => "session-member-joined",
            Self::MemberLeft { .. } => "session-member-left",
            Self::MemberRemoved { .. } => "session-member-removed",
            Self::Started { .. } => "session-started",
            Self::Ended { .. } => "session-ended",
            Self::Deleted { .. } => "session-deleted",
        }
    }
}

/// An event with the time it was emitted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: SessionEvent,
}

/// Broadcasts session events to any number of subscribers
pub struct SessionEventEmitter {
    tx: broadcast::Sender<TimedEvent>,
}

impl SessionEventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimedEvent> {
        self.tx.subscribe()
    }

    /// Emit to current subscribers. Having none is fine.
    pub fn emit(&self, event: SessionEvent) {
        let name = event.event_name();
        let timed = TimedEvent {
            at: Utc::now(),
            event,
        };
        match self.tx.send(timed) {
            Ok(receivers) => debug!("Emitted {} to {} subscriber(s)", name, receivers),
            Err(_) => debug!("Emitted {} with no subscribers", name),
        }
    }
}

impl Default for SessionEventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
