//! Event types for playtimed -> client streaming

use chrono::{DateTime, Local};
use playtime_util::UserId;
use serde::{Deserialize, Serialize};

use crate::{RewardKind, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: playtime_util::now(),
            payload,
        }
    }
}

/// All possible events from the daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    UserLoggedIn {
        user_id: UserId,
        display_name: String,
    },

    UserLoggedOut {
        user_id: UserId,
        session_ms: u64,
        total_ms: u64,
    },

    /// A reward rule was granted (at most once per user and rule index)
    RewardGranted {
        user_id: UserId,
        rule_index: usize,
        kind: RewardKind,
        payload: String,
    },

    /// A grant attempt failed; it will be retried on the next sweep
    RewardFailed {
        user_id: UserId,
        rule_index: usize,
        error: String,
    },

    /// An administrator replaced a user's accumulated playtime
    PlaytimeSet {
        user_id: UserId,
        total_ms: u64,
    },

    /// The ledger was written to the store
    LedgerSaved { user_count: usize },

    /// Reward configuration was reloaded
    ConfigReloaded { rule_count: usize, enabled: bool },

    /// Daemon is shutting down
    Shutdown,
}
