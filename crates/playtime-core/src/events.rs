//! Core events emitted by the engine

use playtime_api::RewardKind;
use playtime_util::UserId;

/// Events emitted by the core engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// A session was opened (or re-opened)
    UserLoggedIn {
        user_id: UserId,
        display_name: String,
    },

    /// A session was closed and folded into the ledger
    UserLoggedOut {
        user_id: UserId,
        session_ms: u64,
        total_ms: u64,
    },

    /// Accumulated time was replaced by an administrator
    PlaytimeSet {
        user_id: UserId,
        total_ms: u64,
    },

    /// A rule's reward was applied and recorded
    RewardGranted {
        user_id: UserId,
        rule_index: usize,
        kind: RewardKind,
        payload: String,
    },

    /// A grant attempt failed; the rule stays eligible
    RewardFailed {
        user_id: UserId,
        rule_index: usize,
        error: String,
    },

    /// A reached rule names a reward type nobody can apply
    RewardSkipped {
        user_id: UserId,
        rule_index: usize,
        kind: String,
    },

    /// The ledger was persisted
    LedgerSaved {
        user_count: usize,
    },

    /// Reward settings were swapped
    RewardsReloaded {
        rule_count: usize,
        enabled: bool,
    },
}
