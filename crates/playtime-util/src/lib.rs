//! Shared utilities for playtimed
//!
//! This crate provides:
//! - ID types (UserId, ClientId)
//! - Clock helpers and playtime formatting
//! - Human-written duration parsing ("1d12h")
//! - Error types
//! - Default paths for socket, config, and data directories

mod error;
mod ids;
mod paths;
mod time;
mod timespec;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
pub use timespec::*;
