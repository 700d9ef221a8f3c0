//! Event types for clockistryd -> client streaming

use chrono::{DateTime, Utc};
use clockistry_util::{EntryId, UserId};
use serde::{Deserialize, Serialize};

use crate::{TimeEntry, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: clockistry_util::now(),
            payload,
        }
    }

    /// Owner of the timer this event is about, if any
    pub fn user_id(&self) -> Option<&UserId> {
        self.payload.user_id()
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A timer was started
    TimerStarted { entry: TimeEntry },

    /// Editable fields of an entry changed
    TimerUpdated {
        entry_id: EntryId,
        user_id: UserId,
    },

    /// A timer was stopped and its duration fixed
    TimerStopped { entry: TimeEntry },

    /// Service is shutting down
    Shutdown,
}

impl EventPayload {
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            EventPayload::TimerStarted { entry } | EventPayload::TimerStopped { entry } => {
                Some(&entry.user_id)
            }
            EventPayload::TimerUpdated { user_id, .. } => Some(user_id),
            EventPayload::Shutdown => None,
        }
    }
}
