//! Local socket transport for clockistryd
//!
//! One JSON message per line over a Unix domain socket. Clients send
//! [`Request`](clockistry_api::Request)s and read back the matching
//! [`Response`](clockistry_api::Response); a client that subscribes stops
//! issuing requests and receives timer [`Event`](clockistry_api::Event)s,
//! either for every user or for one.

mod client;
mod server;

pub use client::*;
pub use server::*;

use clockistry_api::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    /// A reply arrived for a request this client did not send
    #[error("expected response to request {expected}, got {got}")]
    Mismatched { expected: u64, got: u64 },

    /// clockistryd answered with an error
    #[error("{code:?}: {message}")]
    Rejected { code: ErrorCode, message: String },

    #[error("Server not started")]
    NotStarted,
}

impl IpcError {
    /// Protocol error code, if the service rejected the request
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            IpcError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type IpcResult<T> = Result<T, IpcError>;
