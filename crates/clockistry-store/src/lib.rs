//! Persistence layer for clockistryd
//!
//! Provides:
//! - The `DocumentStore` contract (get / set / update / equality query)
//! - A conditional create used to guard the one-running-timer-per-user slot
//! - A conditional update used to stop an entry exactly once
//! - Sparse document encoding (absent fields are never written)
//! - In-memory and SQLite backends

mod document;
mod memory;
mod sqlite;
mod traits;

pub use document::*;
pub use memory::*;
pub use sqlite::*;
pub use traits::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Unsupported query: {0}")]
    InvalidQuery(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
