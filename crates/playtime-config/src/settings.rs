//! Validated settings structures

use crate::rules::RuleTable;
use crate::schema::{RawConfig, RawGrants, RawRewards, RawServiceConfig};
use playtime_util::{default_data_dir, default_socket_path};
use std::path::PathBuf;
use std::time::Duration;

/// Default tick cadence (one game tick)
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Default ledger flush cadence, in ticks (one minute at the default tick)
pub const DEFAULT_FLUSH_EVERY_TICKS: u64 = 1200;

pub const DEFAULT_GRANT_TIMEOUT: Duration = Duration::from_secs(10);

/// Validated configuration ready for use by the daemon
#[derive(Debug, Clone)]
pub struct PlaytimeConfig {
    pub service: ServiceConfig,
    pub rewards: RewardSettings,
    pub grants: GrantTemplates,
}

impl PlaytimeConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            rewards: RewardSettings::from_raw(raw.rewards),
            grants: GrantTemplates::from_raw(raw.grants),
        }
    }
}

impl Default for PlaytimeConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            rewards: RewardSettings::from_raw(RawRewards::default()),
            grants: GrantTemplates::default(),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub tick_interval: Duration,
    pub flush_every_ticks: u64,
    pub grant_timeout: Duration,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw.socket_path.unwrap_or_else(default_socket_path),
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            tick_interval: raw
                .tick_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TICK_INTERVAL),
            flush_every_ticks: raw.flush_every_ticks.unwrap_or(DEFAULT_FLUSH_EVERY_TICKS),
            grant_timeout: raw
                .grant_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_GRANT_TIMEOUT),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// Reward switch plus the positional rule table. Swapped as a unit on reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardSettings {
    pub enabled: bool,
    pub rules: RuleTable,
}

impl RewardSettings {
    pub fn from_raw(raw: RawRewards) -> Self {
        Self {
            enabled: raw.enabled,
            rules: RuleTable::parse(&raw.rules),
        }
    }

    pub fn new(enabled: bool, rules: RuleTable) -> Self {
        Self { enabled, rules }
    }
}

/// Shell templates for applying grants. A missing template means the
/// corresponding reward kind is unavailable on this host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantTemplates {
    pub group_command: Option<String>,
    pub permission_command: Option<String>,
    pub console_command: Option<String>,
}

impl GrantTemplates {
    fn from_raw(raw: RawGrants) -> Self {
        Self {
            group_command: raw.group_command,
            permission_command: raw.permission_command,
            console_command: raw.console_command,
        }
    }
}
