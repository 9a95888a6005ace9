//! Core playtime engine for playtimed
//!
//! This crate is the heart of playtimed, containing:
//! - The session ledger (accumulated time, live sessions, granted rewards)
//! - The reward dispatcher (threshold sweep, grant calls with timeout)
//! - Engine lifecycle (Stopped -> Loading -> Running -> Stopping -> Stopped)
//! - Periodic tick with sweeps and scheduled persistence

mod dispatcher;
mod engine;
mod events;
mod ledger;

pub use dispatcher::*;
pub use engine::*;
pub use events::*;
pub use ledger::*;
