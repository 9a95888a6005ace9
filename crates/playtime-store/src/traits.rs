//! Store trait definitions

use playtime_util::UserId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::StoreResult;

/// Main store trait
pub trait Store: Send + Sync {
    /// Load the last saved ledger. `None` if nothing was ever saved.
    fn load_snapshot(&self) -> StoreResult<Option<LedgerSnapshot>>;

    /// Replace the saved ledger with `snapshot`
    fn save_snapshot(&self, snapshot: &LedgerSnapshot) -> StoreResult<()>;

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// Persisted form of the ledger. Session markers are never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Accumulated milliseconds per user
    #[serde(rename = "playtimes", default)]
    pub playtimes: BTreeMap<UserId, u64>,

    /// Rule indices already granted per user
    #[serde(rename = "givenRewards", default)]
    pub given_rewards: BTreeMap<UserId, BTreeSet<usize>>,
}

impl LedgerSnapshot {
    /// Number of distinct users mentioned in either map
    pub fn user_count(&self) -> usize {
        self.playtimes
            .keys()
            .chain(self.given_rewards.keys())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.playtimes.is_empty() && self.given_rewards.is_empty()
    }
}
