//! Shared utilities for clockistryd
//!
//! This crate provides:
//! - ID types (EntryId, UserId, ClientId)
//! - Clock abstraction (system clock with mock-time override, manual clock for tests)
//! - Rate limiting helpers
//! - Default paths for socket, data, and config locations

mod ids;
mod paths;
mod rate_limit;
mod time;

pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
