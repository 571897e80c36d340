//! Result types returned by the orchestrator and the status query.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::sync_job::{self, SyncJobKind, SyncJobStatus};

/// Outcome of one remote system's sync pass.
///
/// `success` is false whenever `error` is set, and also when there was
/// nothing to sync against (`message` then says why).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SubResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub items_synced: i32,
    pub items_created: i32,
    pub items_updated: i32,
    pub financials_updated: bool,
    pub risks_synced: i32,
    /// Non-fatal per-item problems (skipped issues, ignored lookups)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// Incremental cursor to store on the job when this pass succeeds
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub cursor: Option<JsonValue>,
}

impl SubResult {
    pub(crate) fn started() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Nothing to sync; not an error.
    pub(crate) fn skipped(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub(crate) fn fail(&mut self, error: impl Into<String>) {
        self.success = false;
        self.error = Some(error.into());
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Combined result of a full project sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncResult {
    pub project_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub jira: SubResult,
    pub delivery: SubResult,
}

impl SyncResult {
    pub fn has_errors(&self) -> bool {
        self.jira.has_error() || self.delivery.has_error()
    }

    /// `error` strings of both halves joined, if any.
    pub fn error_summary(&self) -> Option<String> {
        let errors: Vec<String> = [("jira", &self.jira), ("delivery", &self.delivery)]
            .into_iter()
            .filter_map(|(name, sub)| sub.error.as_ref().map(|e| format!("{name}: {e}")))
            .collect();
        (!errors.is_empty()).then(|| errors.join("; "))
    }
}

/// Compact view of a ledger row for status responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobSummary {
    pub id: Uuid,
    pub kind: SyncJobKind,
    pub status: SyncJobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub items_synced: i32,
    pub items_created: i32,
    pub items_updated: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    pub created_at: DateTime<FixedOffset>,
    pub started_at: Option<DateTime<FixedOffset>>,
    pub completed_at: Option<DateTime<FixedOffset>>,
}

impl From<sync_job::Model> for JobSummary {
    fn from(job: sync_job::Model) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            status: job.status,
            error: job.error,
            items_synced: job.items_synced,
            items_created: job.items_created,
            items_updated: job.items_updated,
            requested_by: job.requested_by,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

/// Per-kind ledger state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct KindStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_job: Option<JobSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_completed_job: Option<JobSummary>,
}

/// Configuration, link and ledger state for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncStatus {
    pub project_id: Uuid,
    pub last_synced_at: Option<DateTime<FixedOffset>>,
    /// Credentials for the issue tracker are present
    pub jira_configured: bool,
    /// The project carries a tracker key or URL
    pub jira_linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jira_project_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jira_project_name: Option<String>,
    pub delivery_configured: bool,
    pub delivery_linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
    pub jira: KindStatus,
    pub delivery: KindStatus,
    pub full: KindStatus,
}
