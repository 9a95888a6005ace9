//! Shell grant backend implementation

use async_trait::async_trait;
use playtime_api::RewardKind;
use playtime_host_api::{GrantBackend, GrantCapabilities, GrantTarget, HostError, HostResult};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{render_template, TemplateVars};

/// Command templates, one per reward kind. A kind without a template is
/// reported unsupported.
#[derive(Debug, Clone, Default)]
pub struct ShellTemplates {
    pub group_command: Option<String>,
    pub permission_command: Option<String>,
    pub console_command: Option<String>,
}

impl ShellTemplates {
    fn for_kind(&self, kind: RewardKind) -> Option<&str> {
        match kind {
            RewardKind::Group => self.group_command.as_deref(),
            RewardKind::Permission => self.permission_command.as_deref(),
            RewardKind::Command => self.console_command.as_deref(),
        }
    }
}

/// Applies grants by running configured shell commands.
///
/// A command that exits 0 means the reward is in effect. Templates are
/// expected to be idempotent, e.g. adding a group the user already has.
pub struct ShellGrants {
    capabilities: GrantCapabilities,
    templates: ShellTemplates,
}

impl ShellGrants {
    pub fn new(templates: ShellTemplates) -> Self {
        let mut capabilities = GrantCapabilities::none();
        for kind in RewardKind::ALL {
            if templates.for_kind(kind).is_some() {
                capabilities = capabilities.with_kind(kind);
            }
        }

        if capabilities.kinds_supported.is_empty() {
            warn!("No grant templates configured; rewards cannot be applied");
        }

        Self {
            capabilities,
            templates,
        }
    }

    async fn run(&self, kind: RewardKind, target: &GrantTarget, value: &str) -> HostResult<()> {
        let template = self
            .templates
            .for_kind(kind)
            .ok_or(HostError::Unavailable(kind))?;

        let uuid = target.user_id.to_string();
        let mut vars = TemplateVars {
            uuid: &uuid,
            player: &target.display_name,
            ..Default::default()
        };
        match kind {
            RewardKind::Group => vars.group = Some(value),
            RewardKind::Permission => vars.permission = Some(value),
            RewardKind::Command => vars.command = Some(value),
        }

        let line = render_template(template, &vars);
        debug!(%kind, user_id = %target.user_id, command = %line, "Running grant command");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = match stderr.trim() {
            "" => format!("'{}' exited with {}", line, output.status),
            detail => format!("'{}' exited with {}: {}", line, output.status, detail),
        };
        Err(HostError::GrantFailed(reason))
    }
}

#[async_trait]
impl GrantBackend for ShellGrants {
    fn capabilities(&self) -> &GrantCapabilities {
        &self.capabilities
    }

    async fn grant_group(&self, target: &GrantTarget, group: &str) -> HostResult<()> {
        self.run(RewardKind::Group, target, group).await
    }

    async fn grant_permission(&self, target: &GrantTarget, permission: &str) -> HostResult<()> {
        self.run(RewardKind::Permission, target, permission).await
    }

    async fn run_command(&self, target: &GrantTarget, command: &str) -> HostResult<()> {
        self.run(RewardKind::Command, target, command).await
    }
}
