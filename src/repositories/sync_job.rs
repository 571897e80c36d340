//! # SyncJob Repository
//!
//! The job ledger. Every sync attempt gets a row here; status moves are
//! conditional updates so two writers can never push a job backwards.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{SyncError, is_unique_violation};
use crate::models::sync_job::{ActiveModel, Column, Entity, Model, SyncJobKind, SyncJobStatus};

/// Item counters recorded when a job terminates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub synced: i32,
    pub created: i32,
    pub updated: i32,
}

/// Repository for sync job ledger operations
#[derive(Debug, Clone)]
pub struct SyncJobRepository {
    db: DatabaseConnection,
}

impl SyncJobRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Returns the active job for `(project, kind)` or creates a queued one.
    ///
    /// The boolean is `true` when an existing job was returned. A concurrent
    /// insert that loses the race against the partial unique index is folded
    /// into the deduplicated path.
    pub async fn enqueue_or_get_existing(
        &self,
        project_id: Uuid,
        kind: SyncJobKind,
        requested_by: Option<&str>,
    ) -> Result<(Model, bool), SyncError> {
        if let Some(existing) = self.get_active(project_id, kind).await? {
            tracing::info!(
                project_id = %project_id,
                kind = %kind,
                job_id = %existing.id,
                status = %existing.status,
                "Sync already in flight, returning existing job"
            );
            return Ok((existing, true));
        }

        self.insert_queued(project_id, kind, requested_by).await
    }

    /// Inserts a queued job, deferring to the partial unique index when a
    /// concurrent writer got there first.
    async fn insert_queued(
        &self,
        project_id: Uuid,
        kind: SyncJobKind,
        requested_by: Option<&str>,
    ) -> Result<(Model, bool), SyncError> {
        let now = Utc::now().fixed_offset();
        let job = ActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(project_id),
            kind: Set(kind),
            status: Set(SyncJobStatus::Queued),
            requested_by: Set(requested_by.map(str::to_string)),
            error: Set(None),
            items_synced: Set(0),
            items_created: Set(0),
            items_updated: Set(0),
            cursor: Set(None),
            created_at: Set(now),
            started_at: Set(None),
            completed_at: Set(None),
            updated_at: Set(now),
        };

        match job.insert(&self.db).await {
            Ok(created) => {
                tracing::info!(
                    project_id = %project_id,
                    kind = %kind,
                    job_id = %created.id,
                    "Sync job enqueued"
                );
                Ok((created, false))
            }
            Err(err) if is_unique_violation(&err) => {
                tracing::debug!(project_id = %project_id, kind = %kind, "Lost enqueue race, re-reading active job");
                match self.get_active(project_id, kind).await? {
                    Some(existing) => Ok((existing, true)),
                    // The winner finished between our insert and the re-read.
                    None => Err(SyncError::Database(err)),
                }
            }
            Err(err) => {
                tracing::error!(project_id = %project_id, kind = %kind, error = %err, "Failed to enqueue sync job");
                Err(err.into())
            }
        }
    }

    /// `queued -> running`
    pub async fn mark_running(&self, job_id: Uuid) -> Result<Model, SyncError> {
        let now = Utc::now().fixed_offset();
        self.transition(
            job_id,
            SyncJobStatus::Running,
            ActiveModel {
                started_at: Set(Some(now)),
                ..Default::default()
            },
        )
        .await
    }

    /// `running -> succeeded`, recording counters and the next cursor.
    pub async fn mark_succeeded(
        &self,
        job_id: Uuid,
        counts: JobCounts,
        cursor: Option<JsonValue>,
    ) -> Result<Model, SyncError> {
        let now = Utc::now().fixed_offset();
        self.transition(
            job_id,
            SyncJobStatus::Succeeded,
            ActiveModel {
                error: Set(None),
                items_synced: Set(counts.synced),
                items_created: Set(counts.created),
                items_updated: Set(counts.updated),
                cursor: Set(cursor),
                completed_at: Set(Some(now)),
                ..Default::default()
            },
        )
        .await
    }

    /// `queued|running -> failed`
    pub async fn mark_failed(
        &self,
        job_id: Uuid,
        error: &str,
        counts: JobCounts,
    ) -> Result<Model, SyncError> {
        let now = Utc::now().fixed_offset();
        self.transition(
            job_id,
            SyncJobStatus::Failed,
            ActiveModel {
                error: Set(Some(error.to_string())),
                items_synced: Set(counts.synced),
                items_created: Set(counts.created),
                items_updated: Set(counts.updated),
                completed_at: Set(Some(now)),
                ..Default::default()
            },
        )
        .await
    }

    /// Applies `changes` plus the new status only while the job is still in
    /// one of the target's allowed source statuses.
    async fn transition(
        &self,
        job_id: Uuid,
        to: SyncJobStatus,
        mut changes: ActiveModel,
    ) -> Result<Model, SyncError> {
        changes.status = Set(to);
        changes.updated_at = Set(Utc::now().fixed_offset());

        let result = Entity::update_many()
            .set(changes)
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.is_in(to.allowed_sources().iter().copied()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            let current = self.get(job_id).await?.ok_or(SyncError::JobNotFound(job_id))?;
            tracing::warn!(
                job_id = %job_id,
                from = %current.status,
                to = %to,
                "Rejected sync job transition"
            );
            return Err(SyncError::InvalidTransition {
                job_id,
                from: current.status,
                to,
            });
        }

        let updated = self.get(job_id).await?.ok_or(SyncError::JobNotFound(job_id))?;
        tracing::debug!(job_id = %job_id, status = %updated.status, "Sync job transitioned");
        Ok(updated)
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Option<Model>, SyncError> {
        Ok(Entity::find_by_id(job_id).one(&self.db).await?)
    }

    /// The queued or running job for `(project, kind)`, if any.
    pub async fn get_active(
        &self,
        project_id: Uuid,
        kind: SyncJobKind,
    ) -> Result<Option<Model>, SyncError> {
        let job = Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .filter(Column::Kind.eq(kind))
            .filter(Column::Status.is_in(SyncJobStatus::ACTIVE))
            .order_by_desc(Column::CreatedAt)
            .one(&self.db)
            .await?;
        Ok(job)
    }

    /// Most recent terminal job of exactly this kind, successful or not.
    pub async fn get_last_completed(
        &self,
        project_id: Uuid,
        kind: SyncJobKind,
    ) -> Result<Option<Model>, SyncError> {
        let job = Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .filter(Column::Kind.eq(kind))
            .filter(Column::Status.is_in(SyncJobStatus::TERMINAL))
            .order_by_desc(Column::CompletedAt)
            .one(&self.db)
            .await?;
        Ok(job)
    }

    /// Most recent successful job whose data covers `kind`.
    ///
    /// Its `completed_at` anchors the incremental window.
    pub async fn get_last_successful(
        &self,
        project_id: Uuid,
        kind: SyncJobKind,
    ) -> Result<Option<Model>, SyncError> {
        let job = Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .filter(Column::Kind.is_in(kind.covering_kinds().iter().copied()))
            .filter(Column::Status.eq(SyncJobStatus::Succeeded))
            .order_by_desc(Column::CompletedAt)
            .one(&self.db)
            .await?;
        Ok(job)
    }

    /// Like [`Self::get_last_successful`], restricted to jobs that recorded a
    /// cursor. A full job whose issue pass was skipped carries none and so
    /// never anchors the issue window.
    pub async fn get_last_successful_with_cursor(
        &self,
        project_id: Uuid,
        kind: SyncJobKind,
    ) -> Result<Option<Model>, SyncError> {
        let job = Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .filter(Column::Kind.is_in(kind.covering_kinds().iter().copied()))
            .filter(Column::Status.eq(SyncJobStatus::Succeeded))
            .filter(Column::Cursor.is_not_null())
            .order_by_desc(Column::CompletedAt)
            .one(&self.db)
            .await?;
        Ok(job)
    }

    /// Every queued or running job across all projects, oldest first.
    pub async fn list_active(&self) -> Result<Vec<Model>, SyncError> {
        let jobs = Entity::find()
            .filter(Column::Status.is_in(SyncJobStatus::ACTIVE))
            .order_by_asc(Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(jobs)
    }

    /// Newest-first job history for one project.
    pub async fn list_for_project(
        &self,
        project_id: Uuid,
        limit: u64,
    ) -> Result<Vec<Model>, SyncError> {
        let jobs = Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(jobs)
    }
}
