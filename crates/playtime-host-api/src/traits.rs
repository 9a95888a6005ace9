//! Grant backend traits

use async_trait::async_trait;
use playtime_api::RewardKind;
use playtime_util::UserId;
use std::time::Duration;
use thiserror::Error;

use crate::GrantCapabilities;

/// Errors from grant backend operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0} rewards are not available on this host")]
    Unavailable(RewardKind),

    #[error("Grant failed: {0}")]
    GrantFailed(String),

    #[error("Grant timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HostResult<T> = Result<T, HostError>;

/// The user a reward is applied to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantTarget {
    pub user_id: UserId,
    /// Name supplied at login; substituted for `%player%` in commands
    pub display_name: String,
}

impl GrantTarget {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }
}

/// Grant backend trait - implemented by host-specific adapters.
///
/// `Ok(())` means the reward is now in effect. Granting something the user
/// already has must also return `Ok(())`.
#[async_trait]
pub trait GrantBackend: Send + Sync {
    /// Get the capabilities of this backend
    fn capabilities(&self) -> &GrantCapabilities;

    /// Add the user to a permission group
    async fn grant_group(&self, target: &GrantTarget, group: &str) -> HostResult<()>;

    /// Give the user a single permission node
    async fn grant_permission(&self, target: &GrantTarget, permission: &str) -> HostResult<()>;

    /// Run a console command; `%player%` has already been substituted
    async fn run_command(&self, target: &GrantTarget, command: &str) -> HostResult<()>;

    /// Optional: check if the backend is healthy
    fn is_healthy(&self) -> bool {
        true
    }
}
