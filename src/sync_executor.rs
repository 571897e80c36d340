//! Sync Executor
//!
//! Runs ledger jobs outside the request that created them. The executor owns
//! its database handle and builds a fresh adapter pair for every run, so
//! nothing a request holds is touched after the request returns.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::connectors::ClientFactory;
use crate::error::SyncError;
use crate::models::sync_job::{self, SyncJobKind, SyncJobStatus};
use crate::repositories::{JobCounts, SyncJobRepository};
use crate::sync::{SyncResult, SyncService};
use crate::telemetry::{TraceContext, with_trace_context};

/// Error recorded on jobs that were running when the process stopped.
pub const INTERRUPTED_MESSAGE: &str = "interrupted: the service stopped while this job was running";

/// What [`SyncExecutor::recover`] did.
#[derive(Debug, Default)]
pub struct Recovery {
    pub interrupted: Vec<Uuid>,
    pub resumed: Vec<JoinHandle<Option<SyncResult>>>,
}

impl Recovery {
    pub fn is_empty(&self) -> bool {
        self.interrupted.is_empty() && self.resumed.is_empty()
    }
}

/// Background job runner.
#[derive(Clone)]
pub struct SyncExecutor {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
    factory: Arc<dyn ClientFactory>,
}

impl SyncExecutor {
    pub fn new(
        db: DatabaseConnection,
        config: Arc<AppConfig>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            db,
            config,
            factory,
        }
    }

    /// The executor's own handle; shares no state with request handlers.
    pub fn db(&self) -> DatabaseConnection {
        self.db.clone()
    }

    pub fn ledger(&self) -> SyncJobRepository {
        SyncJobRepository::new(self.db.clone())
    }

    /// Enqueues `(project, kind)` and starts it unless an equivalent job is
    /// already in flight. Returns the job and whether it was deduplicated.
    pub async fn submit(
        &self,
        project_id: Uuid,
        kind: SyncJobKind,
        requested_by: Option<&str>,
    ) -> Result<(sync_job::Model, bool), SyncError> {
        let (job, deduplicated) = self
            .ledger()
            .enqueue_or_get_existing(project_id, kind, requested_by)
            .await?;
        if !deduplicated {
            self.spawn(&job);
        }
        Ok((job, deduplicated))
    }

    /// Detaches a task running `job` to completion.
    ///
    /// A panic inside the run is caught here and recorded as a failure, so
    /// the job never stays active behind the dedup guard.
    pub fn spawn(&self, job: &sync_job::Model) -> JoinHandle<Option<SyncResult>> {
        let executor = self.clone();
        let (job_id, kind) = (job.id, job.kind);
        tokio::spawn(async move {
            let started = Instant::now();
            let worker = executor.clone();
            let run = tokio::spawn(async move {
                with_trace_context(TraceContext::for_job(job_id), worker.run_job(job_id, kind)).await
            });
            match run.await {
                Ok(result) => result,
                Err(err) => {
                    error!(job_id = %job_id, kind = %kind, error = %err, "Sync task aborted");
                    let message = format!("sync task aborted: {err}");
                    if let Err(mark_err) = executor
                        .ledger()
                        .mark_failed(job_id, &message, JobCounts::default())
                        .await
                    {
                        error!(job_id = %job_id, error = %mark_err, "Failed to record aborted sync job");
                    }
                    record_outcome(kind, "aborted", started);
                    None
                }
            }
        })
    }

    /// Settles jobs a previous process left active. Running jobs lost their
    /// worker and are failed; queued jobs never started and are spawned again.
    ///
    /// Call once at startup, before the scheduler or API can enqueue.
    pub async fn recover(&self) -> Result<Recovery, SyncError> {
        let ledger = self.ledger();
        let mut recovery = Recovery::default();

        for job in ledger.list_active().await? {
            match job.status {
                SyncJobStatus::Running => {
                    match ledger
                        .mark_failed(job.id, INTERRUPTED_MESSAGE, JobCounts::default())
                        .await
                    {
                        Ok(_) => recovery.interrupted.push(job.id),
                        Err(err) => {
                            warn!(job_id = %job.id, error = %err, "Could not fail interrupted sync job")
                        }
                    }
                }
                _ => recovery.resumed.push(self.spawn(&job)),
            }
        }

        if !recovery.is_empty() {
            info!(
                interrupted = recovery.interrupted.len(),
                resumed = recovery.resumed.len(),
                "Recovered sync jobs left active by a previous run"
            );
        }
        Ok(recovery)
    }

    /// Runs one job through the ledger lifecycle.
    ///
    /// Never returns an error: failures are logged and recorded on the job.
    /// The result is returned when the orchestration itself completed.
    #[instrument(skip(self), fields(job_id = %job_id, kind = %kind))]
    pub async fn run_job(&self, job_id: Uuid, kind: SyncJobKind) -> Option<SyncResult> {
        let started = Instant::now();
        let ledger = self.ledger();

        let job = match ledger.mark_running(job_id).await {
            Ok(job) => job,
            Err(err) => {
                warn!(error = %err, "Could not start sync job");
                record_outcome(kind, "rejected", started);
                return None;
            }
        };
        info!(project_id = %job.project_id, "Sync job running");

        let outcome = self.execute(job.project_id, kind).await;

        let (recorded, label, result) = match outcome {
            Ok(result) => {
                let counts = counts_of(&result);
                if let Some(summary) = result.error_summary() {
                    (ledger.mark_failed(job_id, &summary, counts).await, "failed", Some(result))
                } else {
                    let cursor = result.jira.cursor.clone();
                    (ledger.mark_succeeded(job_id, counts, cursor).await, "succeeded", Some(result))
                }
            }
            Err(err) => {
                error!(error = %err, "Sync job aborted");
                (
                    ledger.mark_failed(job_id, &err.to_string(), JobCounts::default()).await,
                    "failed",
                    None,
                )
            }
        };

        match recorded {
            Ok(job) => info!(
                status = %job.status,
                items_synced = job.items_synced,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Sync job finished"
            ),
            Err(err) => error!(error = %err, "Failed to record sync job outcome"),
        }
        record_outcome(kind, label, started);
        result
    }

    async fn execute(&self, project_id: Uuid, kind: SyncJobKind) -> Result<SyncResult, SyncError> {
        let clients = self.factory.create()?;
        let service = SyncService::new(self.db.clone(), Arc::clone(&self.config), clients);
        let result = service.run(project_id, kind).await;
        service.close().await;
        result
    }
}

fn counts_of(result: &SyncResult) -> JobCounts {
    JobCounts {
        synced: result.jira.items_synced + result.delivery.items_synced,
        created: result.jira.items_created + result.delivery.items_created,
        updated: result.jira.items_updated + result.delivery.items_updated,
    }
}

fn record_outcome(kind: SyncJobKind, outcome: &'static str, started: Instant) {
    counter!("sync_jobs_total", "kind" => kind.as_str(), "outcome" => outcome).increment(1);
    histogram!("sync_job_duration_ms", "kind" => kind.as_str())
        .record(started.elapsed().as_secs_f64() * 1_000.0);
}
