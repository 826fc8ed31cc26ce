//! Session State
//!
//! Stored Session and Member records, plus the result types the coordinator
//! hands back when part of a multi-item operation had to be skipped.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::Record;

/// Secondary index on the member collection
pub const MEMBER_SESSION_INDEX: &str = "sessionId";

/// Field toggled by start/end
pub const STARTED_FIELD: &str = "started";

/// An entity persisted as one record in the entity store
pub trait StoredEntity: Serialize + DeserializeOwned {
    /// Primary key field name inside the record
    const KEY_FIELD: &'static str;

    /// Primary key value
    fn key(&self) -> &str;

    fn to_record(&self) -> Result<Record, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    fn from_record(record: Record) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(record))
    }
}

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    NotStarted,
    Started,
}

impl From<bool> for SessionPhase {
    fn from(started: bool) -> Self {
        if started {
            Self::Started
        } else {
            Self::NotStarted
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Started => write!(f, "started"),
        }
    }
}

/// A game instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub name: String,
    #[serde(default)]
    pub started: bool,
    /// Member that created the session; never changes
    pub owner_id: String,
}

impl Session {
    /// A fresh, not yet started session
    pub fn new(
        session_id: impl Into<String>,
        name: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            name: name.into(),
            started: false,
            owner_id: owner_id.into(),
        }
    }

    pub fn is_owned_by(&self, member_id: &str) -> bool {
        self.owner_id == member_id
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from(self.started)
    }
}

impl StoredEntity for Session {
    const KEY_FIELD: &'static str = "sessionId";

    fn key(&self) -> &str {
        &self.session_id
    }
}

/// A player in exactly one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub member_id: String,
    pub display_name: String,
    pub session_id: String,
}

impl Member {
    pub fn new(
        member_id: impl Into<String>,
        display_name: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            member_id: member_id.into(),
            display_name: display_name.into(),
            session_id: session_id.into(),
        }
    }
}

impl StoredEntity for Member {
    const KEY_FIELD: &'static str = "memberId";

    fn key(&self) -> &str {
        &self.member_id
    }
}

/// Why an item was passed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// Stored record did not decode
    Malformed,
    /// Store rejected the delete
    DeleteFailed,
}

/// An item a multi-item operation could not process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedItem {
    /// Key of the item when it could be recovered from the record
    pub key: Option<String>,
    pub reason: SkipReason,
    pub message: String,
}

impl SkippedItem {
    pub fn malformed(record: &Record, error: &serde_json::Error) -> Self {
        Self {
            key: record
                .get(Member::KEY_FIELD)
                .and_then(Value::as_str)
                .map(str::to_string),
            reason: SkipReason::Malformed,
            message: error.to_string(),
        }
    }

    pub fn delete_failed(key: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            key: Some(key.into()),
            reason: SkipReason::DeleteFailed,
            message: error.to_string(),
        }
    }
}

/// A successful result plus the recoverable failures met along the way
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome<T> {
    pub value: T,
    pub skipped: Vec<SkippedItem>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            skipped: Vec::new(),
        }
    }

    pub fn skip(&mut self, item: SkippedItem) {
        self.skipped.push(item);
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Result of deleting a session and cascading to its members
pub type DeleteReport = Outcome<Vec<String>>;
