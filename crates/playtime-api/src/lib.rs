//! Protocol types for playtimed IPC
//!
//! This crate defines the stable API between playtimed and its hosting
//! application:
//! - Commands (login/logout notifications, queries, admin mutations)
//! - Responses
//! - Events (daemon -> subscribed clients)
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
