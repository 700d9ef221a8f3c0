//! Time entry model and protocol types for clockistryd
//!
//! This crate defines the stable API between clockistryd and clients:
//! - The `TimeEntry` record and its start/patch inputs
//! - Commands (requests from clients)
//! - Responses
//! - Events (service -> clients)
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
