//! # Sync API Handlers
//!
//! Trigger and poll project syncs. The full sync runs inline; the per-system
//! endpoints enqueue a ledger job and return immediately.

use axum::{
    extract::{Path, Query, State, rejection::PathRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::connectors::{IntegrationError, RemoteSystem};
use crate::error::{ApiError, SyncError};
use crate::models::sync_job::{SyncJobKind, SyncJobStatus};
use crate::repositories::ProjectRepository;
use crate::server::AppState;
use crate::sync::{JobSummary, SyncResult, SyncService, SyncStatus};

const DEFAULT_JOB_LIMIT: u64 = 20;
const MAX_JOB_LIMIT: u64 = 100;

/// Response for an accepted (or deduplicated) background sync request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncJobEnqueued {
    /// Ledger job that will carry (or already carries) the work
    pub job_id: Uuid,
    #[schema(example = "queued")]
    pub status: SyncJobStatus,
    pub message: String,
    /// Always true; the request was taken
    pub accepted: bool,
    /// True when an in-flight job for the same project and kind was returned
    pub deduplicated: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct EnqueueQuery {
    /// Free-form requester tag stored on the job
    pub requested_by: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListJobsQuery {
    /// Maximum number of jobs to return (default 20, max 100)
    pub limit: Option<u64>,
}

/// Run a full sync for one project and return the combined result
#[utoipa::path(
    post,
    path = "/sync/{project_id}",
    params(("project_id" = Uuid, Path, description = "Project to sync")),
    responses(
        (status = 200, description = "Sync finished; per-system errors are reported in the body", body = SyncResult),
        (status = 404, description = "Project not found", body = ApiError),
    ),
    tag = "sync"
)]
pub async fn trigger_full_sync(
    State(state): State<AppState>,
    project_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SyncResult>, ApiError> {
    let Path(project_id) = project_id?;
    let clients = state.clients.create()?;
    let service = SyncService::new(state.db.clone(), state.config.clone(), clients);
    let result = service.sync_project(project_id).await;
    service.close().await;
    Ok(Json(result?))
}

/// Enqueue a background issue sync
#[utoipa::path(
    post,
    path = "/sync/{project_id}/jira",
    params(("project_id" = Uuid, Path, description = "Project to sync"), EnqueueQuery),
    responses(
        (status = 202, description = "Job accepted", body = SyncJobEnqueued),
        (status = 404, description = "Project not found", body = ApiError),
        (status = 422, description = "Integration not configured", body = ApiError),
    ),
    tag = "sync"
)]
pub async fn enqueue_jira_sync(
    State(state): State<AppState>,
    project_id: Result<Path<Uuid>, PathRejection>,
    Query(query): Query<EnqueueQuery>,
) -> Result<(StatusCode, Json<SyncJobEnqueued>), ApiError> {
    let Path(project_id) = project_id?;
    enqueue(&state, project_id, SyncJobKind::Jira, query.requested_by.as_deref()).await
}

/// Enqueue a background delivery sync
#[utoipa::path(
    post,
    path = "/sync/{project_id}/delivery",
    params(("project_id" = Uuid, Path, description = "Project to sync"), EnqueueQuery),
    responses(
        (status = 202, description = "Job accepted", body = SyncJobEnqueued),
        (status = 404, description = "Project not found", body = ApiError),
        (status = 422, description = "Integration not configured", body = ApiError),
    ),
    tag = "sync"
)]
pub async fn enqueue_delivery_sync(
    State(state): State<AppState>,
    project_id: Result<Path<Uuid>, PathRejection>,
    Query(query): Query<EnqueueQuery>,
) -> Result<(StatusCode, Json<SyncJobEnqueued>), ApiError> {
    let Path(project_id) = project_id?;
    enqueue(&state, project_id, SyncJobKind::Delivery, query.requested_by.as_deref()).await
}

async fn enqueue(
    state: &AppState,
    project_id: Uuid,
    kind: SyncJobKind,
    requested_by: Option<&str>,
) -> Result<(StatusCode, Json<SyncJobEnqueued>), ApiError> {
    ProjectRepository::new(&state.db).require(project_id).await?;

    let (configured, system) = match kind {
        SyncJobKind::Jira => (state.config.jira.is_configured(), RemoteSystem::Jira),
        SyncJobKind::Delivery => (
            state.config.delivery.is_configured() || state.config.sync.synthetic_fallback,
            RemoteSystem::Delivery,
        ),
        SyncJobKind::Full => (true, RemoteSystem::Jira),
    };
    if !configured {
        return Err(IntegrationError::NotConfigured { system }.into());
    }

    let (job, deduplicated) = state.executor.submit(project_id, kind, requested_by).await?;
    let message = if deduplicated {
        format!("A {kind} sync is already {} for this project", job.status)
    } else {
        format!("{kind} sync queued")
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(SyncJobEnqueued {
            job_id: job.id,
            status: job.status,
            message,
            accepted: true,
            deduplicated,
        }),
    ))
}

/// Fetch one ledger job
#[utoipa::path(
    get,
    path = "/sync/jobs/{job_id}",
    params(("job_id" = Uuid, Path, description = "Ledger job id")),
    responses(
        (status = 200, description = "Job state", body = JobSummary),
        (status = 404, description = "Job not found", body = ApiError),
    ),
    tag = "sync"
)]
pub async fn get_job(
    State(state): State<AppState>,
    job_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<JobSummary>, ApiError> {
    let Path(job_id) = job_id?;
    let job = state
        .executor
        .ledger()
        .get(job_id)
        .await?
        .ok_or(SyncError::JobNotFound(job_id))?;
    Ok(Json(job.into()))
}

/// Configuration, link and ledger state for a project
#[utoipa::path(
    get,
    path = "/sync/{project_id}/status",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Sync status", body = SyncStatus),
        (status = 404, description = "Project not found", body = ApiError),
    ),
    tag = "sync"
)]
pub async fn get_sync_status(
    State(state): State<AppState>,
    project_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SyncStatus>, ApiError> {
    let Path(project_id) = project_id?;
    let clients = state.clients.create()?;
    let service = SyncService::new(state.db.clone(), state.config.clone(), clients);
    Ok(Json(service.get_status(project_id).await?))
}

/// Recent ledger jobs for a project, newest first
#[utoipa::path(
    get,
    path = "/sync/{project_id}/jobs",
    params(("project_id" = Uuid, Path, description = "Project id"), ListJobsQuery),
    responses(
        (status = 200, description = "Job history", body = [JobSummary]),
        (status = 404, description = "Project not found", body = ApiError),
    ),
    tag = "sync"
)]
pub async fn list_project_jobs(
    State(state): State<AppState>,
    project_id: Result<Path<Uuid>, PathRejection>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<JobSummary>>, ApiError> {
    let Path(project_id) = project_id?;
    ProjectRepository::new(&state.db).require(project_id).await?;

    let limit = query.limit.unwrap_or(DEFAULT_JOB_LIMIT).clamp(1, MAX_JOB_LIMIT);
    let jobs = state
        .executor
        .ledger()
        .list_for_project(project_id, limit)
        .await?;
    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}
