//! Grant capabilities model

use playtime_api::RewardKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Describes which reward kinds a grant backend can apply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantCapabilities {
    pub kinds_supported: HashSet<RewardKind>,
}

impl GrantCapabilities {
    /// Backend that can apply every reward kind
    pub fn all() -> Self {
        Self {
            kinds_supported: RewardKind::ALL.into_iter().collect(),
        }
    }

    /// Backend that cannot apply anything (no permission system present)
    pub fn none() -> Self {
        Self {
            kinds_supported: HashSet::new(),
        }
    }

    pub fn with_kind(mut self, kind: RewardKind) -> Self {
        self.kinds_supported.insert(kind);
        self
    }

    pub fn supports_kind(&self, kind: RewardKind) -> bool {
        self.kinds_supported.contains(&kind)
    }
}

impl Default for GrantCapabilities {
    fn default() -> Self {
        Self::all()
    }
}
