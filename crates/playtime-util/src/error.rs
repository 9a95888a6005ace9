//! Error types for playtimed

use thiserror::Error;

use crate::TimeSpecError;

/// Core error type for playtimed operations
#[derive(Debug, Error)]
pub enum PlaytimeError {
    #[error("Engine is not running (state: {0})")]
    NotRunning(String),

    #[error("Invalid time format: {0}")]
    InvalidDuration(#[from] TimeSpecError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaytimeError {
    pub fn not_running(state: impl std::fmt::Display) -> Self {
        Self::NotRunning(state.to_string())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PlaytimeError>;
