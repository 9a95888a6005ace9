//! Shared types for the playtimed API

use chrono::{DateTime, Local};
use playtime_util::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of reward a rule grants, matched against the grant backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    /// Add the user to a permission group
    Group,
    /// Give the user a single permission node
    Permission,
    /// Run a console command (`%player%` is replaced by the display name)
    Command,
}

impl RewardKind {
    pub const ALL: [RewardKind; 3] = [RewardKind::Group, RewardKind::Permission, RewardKind::Command];

    pub fn as_str(&self) -> &'static str {
        match self {
            RewardKind::Group => "group",
            RewardKind::Permission => "permission",
            RewardKind::Command => "command",
        }
    }
}

impl fmt::Display for RewardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown reward type: {0}")]
pub struct UnknownRewardKind(pub String);

impl FromStr for RewardKind {
    type Err = UnknownRewardKind;

    /// Case-insensitive match against `group`, `permission`, `command`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "group" => Ok(RewardKind::Group),
            "permission" => Ok(RewardKind::Permission),
            "command" => Ok(RewardKind::Command),
            _ => Err(UnknownRewardKind(s.to_string())),
        }
    }
}

/// Lifecycle state of the playtime engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Stopped,
    Loading,
    Running,
    Stopping,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Stopped => "stopped",
            EngineState::Loading => "loading",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Playtime of one user as seen by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaytimeView {
    pub user_id: UserId,
    /// Display name supplied at the most recent login; kept after logout
    /// and absent for users not seen since the daemon started
    pub display_name: Option<String>,
    /// Accumulated time including the in-progress session
    pub total_ms: u64,
    /// `total_ms` rendered as `"<H>h <M>m <S>s"`
    pub formatted: String,
    pub online: bool,
    /// When the in-progress session (or its last flush) began
    pub session_started_at: Option<DateTime<Local>>,
    /// Rule indices already granted, ascending
    pub granted_rewards: Vec<usize>,
}

/// Client role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Hosting application: login/logout notifications and queries
    Host,
    /// Local administrator: may also override playtime and reload config
    Admin,
}

impl ClientRole {
    pub fn can_set_playtime(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }

    pub fn can_reload_config(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub engine_state: EngineState,
    pub store_healthy: bool,
    pub grants_healthy: bool,
    pub online_users: usize,
    pub tracked_users: usize,
}
