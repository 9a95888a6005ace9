//! Grant backend trait interfaces for playtimed
//!
//! This crate defines the capability-based interface between the reward
//! dispatcher and whatever actually applies a reward on the host (group
//! membership, permission nodes, console commands). It contains no host
//! code itself.

mod capabilities;
mod mock;
mod traits;

pub use capabilities::*;
pub use mock::*;
pub use traits::*;
