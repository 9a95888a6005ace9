//! Reward dispatcher
//!
//! Routes a reached rule to the matching grant capability and bounds each
//! call with a timeout. Which rules are due is decided by the engine; this
//! type only knows how to apply one.

use playtime_api::RewardKind;
use playtime_config::RewardRule;
use playtime_host_api::{GrantBackend, GrantCapabilities, GrantTarget, HostError, HostResult};
use std::sync::Arc;
use std::time::Duration;

/// Token in command rewards replaced by the player's display name
pub const PLAYER_PLACEHOLDER: &str = "%player%";

/// Substitute the player's display name into a command reward
pub fn substitute_player(command: &str, display_name: &str) -> String {
    command.replace(PLAYER_PLACEHOLDER, display_name)
}

pub struct RewardDispatcher {
    grants: Arc<dyn GrantBackend>,
    timeout: Duration,
}

impl RewardDispatcher {
    pub fn new(grants: Arc<dyn GrantBackend>, timeout: Duration) -> Self {
        Self { grants, timeout }
    }

    pub fn capabilities(&self) -> &GrantCapabilities {
        self.grants.capabilities()
    }

    pub fn is_healthy(&self) -> bool {
        self.grants.is_healthy()
    }

    /// Apply one rule's reward. `Ok(())` means the reward is in effect.
    pub async fn grant(
        &self,
        kind: RewardKind,
        rule: &RewardRule,
        target: &GrantTarget,
    ) -> HostResult<()> {
        if !self.grants.capabilities().supports_kind(kind) {
            return Err(HostError::Unavailable(kind));
        }

        let call = async {
            match kind {
                RewardKind::Group => self.grants.grant_group(target, &rule.payload).await,
                RewardKind::Permission => {
                    self.grants.grant_permission(target, &rule.payload).await
                }
                RewardKind::Command => {
                    let command = substitute_player(&rule.payload, &target.display_name);
                    self.grants.run_command(target, &command).await
                }
            }
        };

        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| HostError::Timeout(self.timeout))?
    }
}
