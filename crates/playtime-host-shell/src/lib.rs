//! Shell-command grant backend for playtimed
//!
//! Provides:
//! - Grant command templates with shell-quoted substitution
//! - Execution through `sh -c` with exit-status based success

mod backend;
mod template;

pub use backend::*;
pub use template::*;
