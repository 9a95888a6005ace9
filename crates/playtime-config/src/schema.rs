//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Global service settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Reward switch and rule lines
    #[serde(default)]
    pub rewards: RawRewards,

    /// Shell templates used to apply grants
    #[serde(default)]
    pub grants: RawGrants,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory holding the ledger file
    pub data_dir: Option<PathBuf>,

    /// Cadence of the periodic tick, in milliseconds
    pub tick_interval_ms: Option<u64>,

    /// Persist the ledger every N ticks
    pub flush_every_ticks: Option<u64>,

    /// Upper bound on a single grant call, in seconds
    pub grant_timeout_secs: Option<u64>,
}

/// Reward configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawRewards {
    /// Master switch for automatic rewards
    #[serde(default = "default_rewards_enabled")]
    pub enabled: bool,

    /// Rule lines in `hours:type:value` form. Position in this list is the
    /// rule's identity in the ledger.
    #[serde(default = "default_reward_rules")]
    pub rules: Vec<String>,
}

impl Default for RawRewards {
    fn default() -> Self {
        Self {
            enabled: default_rewards_enabled(),
            rules: default_reward_rules(),
        }
    }
}

/// Grant command templates
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawGrants {
    /// e.g. `lp user {player} parent add {group}`
    pub group_command: Option<String>,

    /// e.g. `lp user {player} permission set {permission}`
    pub permission_command: Option<String>,

    /// How `command` rewards reach the host console, e.g. `mcrcon {command}`
    pub console_command: Option<String>,
}

fn default_rewards_enabled() -> bool {
    true
}

/// Rules shipped when the config does not name any
pub fn default_reward_rules() -> Vec<String> {
    vec![
        "1:command:say %player% has played for 1 hour!".to_string(),
        "24:group:apprentice".to_string(),
        "168:group:architect".to_string(),
        "720:group:bliblablu".to_string(),
    ]
}
