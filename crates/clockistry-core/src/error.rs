//! Error types for timer operations

use clockistry_api::ErrorCode;
use clockistry_store::StoreError;
use clockistry_util::{EntryId, UserId};
use thiserror::Error;

/// Failure kinds surfaced by the timer lifecycle.
///
/// Every operation fails fast; retries are the caller's decision.
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("A timer is already running for user {user_id}; stop the current timer first")]
    TimerAlreadyRunning {
        user_id: UserId,
        /// The running entry, when it could be identified
        entry_id: Option<EntryId>,
    },

    #[error("Time entry not found: {0}")]
    NotFound(EntryId),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl TimerError {
    /// Protocol error code for this failure
    pub fn code(&self) -> ErrorCode {
        match self {
            TimerError::TimerAlreadyRunning { .. } => ErrorCode::TimerAlreadyRunning,
            TimerError::NotFound(_) => ErrorCode::NotFound,
            TimerError::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
            TimerError::InvalidState(_) => ErrorCode::InvalidState,
        }
    }
}

/// Any store failure that is not a specific, expected condition
pub(crate) fn store_failure(e: StoreError) -> TimerError {
    TimerError::StoreUnavailable(e.to_string())
}

pub type TimerResult<T> = Result<T, TimerError>;
