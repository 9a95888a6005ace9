//! Mock grant backend for testing

use async_trait::async_trait;
use playtime_api::RewardKind;
use playtime_util::UserId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{GrantBackend, GrantCapabilities, GrantTarget, HostError, HostResult};

/// A grant call observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantCall {
    pub kind: RewardKind,
    pub user_id: UserId,
    pub display_name: String,
    /// Group name, permission node or fully substituted command
    pub value: String,
}

/// Mock grant backend for unit/integration testing
pub struct MockGrants {
    capabilities: GrantCapabilities,
    calls: Arc<Mutex<Vec<GrantCall>>>,

    /// Kinds whose grants fail
    pub fail_kinds: Arc<Mutex<HashSet<RewardKind>>>,

    /// Delay before every grant completes (simulates a slow backend)
    pub delay: Arc<Mutex<Option<Duration>>>,
}

impl MockGrants {
    pub fn new() -> Self {
        Self {
            capabilities: GrantCapabilities::all(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_kinds: Arc::new(Mutex::new(HashSet::new())),
            delay: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_capabilities(mut self, caps: GrantCapabilities) -> Self {
        self.capabilities = caps;
        self
    }

    /// Calls received so far, in order (including failed ones)
    pub fn calls(&self) -> Vec<GrantCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Make grants of `kind` fail (or succeed again)
    pub fn set_failing(&self, kind: RewardKind, failing: bool) {
        let mut kinds = self.fail_kinds.lock().unwrap();
        if failing {
            kinds.insert(kind);
        } else {
            kinds.remove(&kind);
        }
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    async fn record(&self, kind: RewardKind, target: &GrantTarget, value: &str) -> HostResult<()> {
        self.calls.lock().unwrap().push(GrantCall {
            kind,
            user_id: target.user_id,
            display_name: target.display_name.clone(),
            value: value.to_string(),
        });

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_kinds.lock().unwrap().contains(&kind) {
            return Err(HostError::GrantFailed(format!("Mock {} failure", kind)));
        }

        Ok(())
    }
}

impl Default for MockGrants {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GrantBackend for MockGrants {
    fn capabilities(&self) -> &GrantCapabilities {
        &self.capabilities
    }

    async fn grant_group(&self, target: &GrantTarget, group: &str) -> HostResult<()> {
        self.record(RewardKind::Group, target, group).await
    }

    async fn grant_permission(&self, target: &GrantTarget, permission: &str) -> HostResult<()> {
        self.record(RewardKind::Permission, target, permission).await
    }

    async fn run_command(&self, target: &GrantTarget, command: &str) -> HostResult<()> {
        self.record(RewardKind::Command, target, command).await
    }
}
