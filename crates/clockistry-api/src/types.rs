//! Shared types for the clockistryd API

use chrono::{DateTime, Utc};
use clockistry_util::{EntryId, UserId};
use serde::{Deserialize, Serialize};

/// A single time entry record.
///
/// Serialized field names match the stored record shape (camelCase). Optional
/// fields with no value and an empty tag list are left out entirely rather
/// than written as `null`/`[]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: EntryId,
    pub user_id: UserId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Whole seconds; 0 while running, fixed at stop
    #[serde(default)]
    pub duration: u64,
    pub is_running: bool,
    #[serde(default)]
    pub is_billable: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeEntry {
    /// Build a freshly started, running entry
    pub fn started(id: EntryId, user_id: UserId, fields: StartTimer, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            company_id: fields.company_id,
            project_id: fields.project_id,
            project_name: fields.project_name,
            client_id: fields.client_id,
            client_name: fields.client_name,
            description: fields.description,
            start_time: now,
            end_time: None,
            duration: 0,
            is_running: true,
            is_billable: fields.is_billable,
            tags: fields.tags,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Caller-supplied fields for a new timer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTimer {
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_billable: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl StartTimer {
    pub fn with_description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Default::default()
        }
    }
}

/// Editable subset of a time entry.
///
/// Lifecycle fields (`startTime`, `endTime`, `duration`, `isRunning`,
/// `userId`, `id`) have no representation here; unknown keys in incoming
/// JSON are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_billable: Option<bool>,
    /// An empty list counts as "no tags" and is not written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl TimerPatch {
    /// True when the patch would write nothing
    pub fn is_empty(&self) -> bool {
        self.project_id.is_none()
            && self.project_name.is_none()
            && self.client_id.is_none()
            && self.client_name.is_none()
            && self.description.is_none()
            && self.is_billable.is_none()
            && self.tags.as_ref().is_none_or(|t| t.is_empty())
    }
}

/// A running entry together with its live elapsed time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningTimer {
    pub entry: TimeEntry,
    pub elapsed_seconds: u64,
    /// Service time the elapsed value was computed at
    pub as_of: DateTime<Utc>,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
}
