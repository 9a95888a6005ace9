//! Configuration validation

use crate::schema::{RawConfig, RawGrants};
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Service setting '{field}': {message}")]
    ServiceError { field: String, message: String },

    #[error("Grant template '{field}' must contain {placeholder}")]
    MissingPlaceholder {
        field: String,
        placeholder: &'static str,
    },

    #[error("Grant template '{0}' cannot be empty")]
    EmptyTemplate(String),
}

/// Validate a raw configuration.
///
/// Rule lines are not checked here: a malformed rule is skipped at grant
/// time rather than failing the whole config. See [`crate::lint_rules`].
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let service = &config.service;
    for (field, value) in [
        ("tick_interval_ms", service.tick_interval_ms),
        ("flush_every_ticks", service.flush_every_ticks),
        ("grant_timeout_secs", service.grant_timeout_secs),
    ] {
        if value == Some(0) {
            errors.push(ValidationError::ServiceError {
                field: field.into(),
                message: "must be greater than zero".into(),
            });
        }
    }

    errors.extend(validate_grants(&config.grants));

    errors
}

fn validate_grants(grants: &RawGrants) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let templates = [
        ("group_command", grants.group_command.as_deref(), "{group}"),
        (
            "permission_command",
            grants.permission_command.as_deref(),
            "{permission}",
        ),
        ("console_command", grants.console_command.as_deref(), "{command}"),
    ];

    for (field, template, placeholder) in templates {
        let Some(template) = template else {
            continue;
        };

        if template.trim().is_empty() {
            errors.push(ValidationError::EmptyTemplate(field.into()));
        } else if !template.contains(placeholder) {
            errors.push(ValidationError::MissingPlaceholder {
                field: field.into(),
                placeholder,
            });
        }
    }

    errors
}
