//! Coordinator Configuration
//!
//! Read once at startup from the process environment.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

pub const SESSIONS_TABLE_ENV: &str = "SESSIONS_TABLE_NAME";
pub const MEMBERS_TABLE_ENV: &str = "MEMBERS_TABLE_NAME";
pub const STALE_JOIN_ENV: &str = "LOBBY_STALE_JOIN";

/// What a join does when the session vanishes between its check and its write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaleJoinPolicy {
    /// Keep the member even if it is now orphaned
    #[default]
    Tolerate,
    /// Re-check the session after the write and undo the join if it is gone
    Reject,
}

impl FromStr for StaleJoinPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tolerate" => Ok(Self::Tolerate),
            "reject" => Ok(Self::Reject),
            other => Err(ConfigError::Invalid {
                name: STALE_JOIN_ENV,
                value: other.to_string(),
            }),
        }
    }
}

/// Configuration errors; all of them are fatal at startup
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Environment variable {0} is not set")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Collection names and join policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyConfig {
    pub sessions_table: String,
    pub members_table: String,
    #[serde(default)]
    pub stale_join: StaleJoinPolicy,
}

impl LobbyConfig {
    pub fn new(sessions_table: impl Into<String>, members_table: impl Into<String>) -> Self {
        Self {
            sessions_table: sessions_table.into(),
            members_table: members_table.into(),
            stale_join: StaleJoinPolicy::default(),
        }
    }

    pub fn with_stale_join(mut self, policy: StaleJoinPolicy) -> Self {
        self.stale_join = policy;
        self
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let sessions_table = required(SESSIONS_TABLE_ENV)?;
        let members_table = required(MEMBERS_TABLE_ENV)?;
        let stale_join = match lookup(STALE_JOIN_ENV) {
            Some(value) if !value.trim().is_empty() => value.parse()?,
            _ => StaleJoinPolicy::default(),
        };

        Ok(Self {
            sessions_table,
            members_table,
            stale_join,
        })
    }
}
