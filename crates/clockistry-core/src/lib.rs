//! Timer lifecycle and duration accounting for clockistryd
//!
//! This crate is the heart of clockistryd, containing:
//! - The timer lifecycle (start -> update* -> stop) over a document store
//! - The one-running-timer-per-user guard
//! - Elapsed time derivation for running entries
//! - A live feed of timer changes for subscribers

mod elapsed;
mod error;
mod events;
mod locks;
mod manager;

pub use elapsed::*;
pub use error::*;
pub use events::*;
pub use locks::*;
pub use manager::*;
