//! SyncJob entity model
//!
//! One row per sync attempt. Rows move `queued -> running -> succeeded|failed`
//! and are never deleted, so the table doubles as the project's sync history.

use std::fmt;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub project_id: Uuid,

    pub kind: SyncJobKind,

    pub status: SyncJobStatus,

    /// Who asked for the sync (user id, "scheduler", "cli", ...)
    pub requested_by: Option<String>,

    /// Aggregated error text when the job failed
    pub error: Option<String>,

    pub items_synced: i32,
    pub items_created: i32,
    pub items_updated: i32,

    /// Opaque incremental cursor, e.g. `{"last_updated": "..."}`. Set only
    /// when the job's issue pass ran.
    #[sea_orm(column_type = "JsonBinary")]
    pub cursor: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,

    pub started_at: Option<DateTimeWithTimeZone>,

    /// Set iff the status is terminal
    pub completed_at: Option<DateTimeWithTimeZone>,

    pub updated_at: DateTimeWithTimeZone,
}

/// Which remote system(s) a job synchronizes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum SyncJobKind {
    #[sea_orm(string_value = "jira")]
    Jira,
    #[sea_orm(string_value = "delivery")]
    Delivery,
    #[sea_orm(string_value = "full")]
    Full,
}

impl SyncJobKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            SyncJobKind::Jira => "jira",
            SyncJobKind::Delivery => "delivery",
            SyncJobKind::Full => "full",
        }
    }

    /// Kinds whose successful completion covers this kind's remote data.
    ///
    /// A full sync may include an issue pass. Whether it actually ran is
    /// recorded by the job's cursor.
    pub const fn covering_kinds(self) -> &'static [SyncJobKind] {
        match self {
            SyncJobKind::Jira => &[SyncJobKind::Jira, SyncJobKind::Full],
            SyncJobKind::Delivery => &[SyncJobKind::Delivery, SyncJobKind::Full],
            SyncJobKind::Full => &[SyncJobKind::Full],
        }
    }
}

impl fmt::Display for SyncJobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncJobKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "jira" => Ok(SyncJobKind::Jira),
            "delivery" | "precursive" => Ok(SyncJobKind::Delivery),
            "full" => Ok(SyncJobKind::Full),
            other => Err(format!("unknown sync kind '{other}'")),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum SyncJobStatus {
    #[sea_orm(string_value = "queued")]
    #[default]
    Queued,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl SyncJobStatus {
    pub const ACTIVE: [SyncJobStatus; 2] = [SyncJobStatus::Queued, SyncJobStatus::Running];
    pub const TERMINAL: [SyncJobStatus; 2] = [SyncJobStatus::Succeeded, SyncJobStatus::Failed];

    pub const fn as_str(self) -> &'static str {
        match self {
            SyncJobStatus::Queued => "queued",
            SyncJobStatus::Running => "running",
            SyncJobStatus::Succeeded => "succeeded",
            SyncJobStatus::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, SyncJobStatus::Succeeded | SyncJobStatus::Failed)
    }

    /// Statuses a job may be in immediately before moving to `self`.
    pub const fn allowed_sources(self) -> &'static [SyncJobStatus] {
        match self {
            SyncJobStatus::Queued => &[],
            SyncJobStatus::Running => &[SyncJobStatus::Queued],
            // A job that fails before the harness marks it running still terminates.
            SyncJobStatus::Succeeded => &[SyncJobStatus::Running],
            SyncJobStatus::Failed => &[SyncJobStatus::Queued, SyncJobStatus::Running],
        }
    }
}

impl fmt::Display for SyncJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id",
        on_delete = "Cascade"
    )]
    Project,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_have_no_outgoing_transitions() {
        for target in [
            SyncJobStatus::Queued,
            SyncJobStatus::Running,
            SyncJobStatus::Succeeded,
            SyncJobStatus::Failed,
        ] {
            assert!(
                target
                    .allowed_sources()
                    .iter()
                    .all(|source| !source.is_terminal()),
                "{target} must not be reachable from a terminal status"
            );
        }
    }

    #[test]
    fn parses_kind_aliases() {
        assert_eq!("JIRA".parse::<SyncJobKind>(), Ok(SyncJobKind::Jira));
        assert_eq!(
            "precursive".parse::<SyncJobKind>(),
            Ok(SyncJobKind::Delivery)
        );
        assert!("everything".parse::<SyncJobKind>().is_err());
    }

    #[test]
    fn full_sync_anchors_issue_window() {
        assert!(SyncJobKind::Jira.covering_kinds().contains(&SyncJobKind::Full));
        assert!(!SyncJobKind::Full.covering_kinds().contains(&SyncJobKind::Jira));
    }
}
