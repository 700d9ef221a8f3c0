//! Command types for the clockistryd protocol

use clockistry_util::{ClientId, EntryId, UserId};
use serde::{Deserialize, Serialize};

use crate::{HealthStatus, RunningTimer, StartTimer, TimeEntry, TimerPatch, API_VERSION};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    /// The user already has a running timer; stop it first
    TimerAlreadyRunning,
    NotFound,
    StoreUnavailable,
    InvalidState,
    RateLimited,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Start a new timer for a user
    StartTimer {
        user_id: UserId,
        #[serde(default)]
        fields: StartTimer,
    },

    /// Edit the mutable fields of an entry
    UpdateTimer { entry_id: EntryId, patch: TimerPatch },

    /// Stop a specific entry
    StopTimer { entry_id: EntryId },

    /// Stop whatever the user currently has running
    StopRunningTimer { user_id: UserId },

    /// Get the user's running timer with live elapsed time
    GetRunningTimer { user_id: UserId },

    /// Fetch a single entry
    GetEntry { entry_id: EntryId },

    /// List a user's entries, newest first
    ListEntries { user_id: UserId },

    /// Subscribe to timer events, optionally for one user only
    SubscribeEvents {
        #[serde(default)]
        user_id: Option<UserId>,
    },

    /// Unsubscribe from events
    UnsubscribeEvents,

    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    TimerStarted(TimeEntry),
    TimerUpdated,
    TimerStopped,
    /// Result of `StopRunningTimer`; `None` when nothing was running
    RunningTimerStopped { entry: Option<TimeEntry> },
    RunningTimer { running: Option<RunningTimer> },
    Entry(TimeEntry),
    Entries { entries: Vec<TimeEntry> },
    Subscribed { client_id: ClientId },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}
