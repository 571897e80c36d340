//! # Sync Scheduler
//!
//! Periodically enqueues a full sync for every linked project. Enqueueing
//! goes through the ledger, so a project whose previous run is still in
//! flight is skipped rather than doubled up.

use std::sync::Arc;

use metrics::{counter, histogram};
use tokio::time::{Duration, Instant, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::config::AppConfig;
use crate::error::SyncError;
use crate::models::sync_job::SyncJobKind;
use crate::repositories::ProjectRepository;
use crate::sync_executor::SyncExecutor;

/// Requester recorded on jobs the scheduler creates.
pub const SCHEDULER_REQUESTER: &str = "scheduler";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub projects_polled: u64,
    pub jobs_enqueued: u64,
    pub jobs_deduplicated: u64,
    pub errors: u64,
}

/// Background scheduler service.
pub struct SyncScheduler {
    config: Arc<AppConfig>,
    executor: SyncExecutor,
}

impl SyncScheduler {
    pub fn new(config: Arc<AppConfig>, executor: SyncExecutor) -> Self {
        Self { config, executor }
    }

    /// Run the scheduler loop until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        let period = Duration::from_secs(self.config.scheduler.interval_seconds);
        info!(interval_secs = period.as_secs(), "Starting sync scheduler");

        let mut ticker = interval(period);
        // The first tick fires immediately; skip it so startup is not a sync storm.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Sync scheduler shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let tick_started = Instant::now();
                    match self.tick().await {
                        Ok(stats) => debug!(
                            polled = stats.projects_polled,
                            enqueued = stats.jobs_enqueued,
                            deduplicated = stats.jobs_deduplicated,
                            errors = stats.errors,
                            "Scheduler tick complete"
                        ),
                        Err(err) => error!(error = %err, "Scheduler tick failed"),
                    }
                    histogram!("sync_scheduler_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    /// One pass over all linked projects.
    pub async fn tick(&self) -> Result<TickStats, SyncError> {
        let db = self.executor.db();
        let projects = ProjectRepository::new(&db).list_linked().await?;
        let mut stats = TickStats::default();

        for project in projects {
            stats.projects_polled += 1;
            match self
                .executor
                .submit(project.id, SyncJobKind::Full, Some(SCHEDULER_REQUESTER))
                .await
            {
                Ok((_, true)) => stats.jobs_deduplicated += 1,
                Ok((job, false)) => {
                    stats.jobs_enqueued += 1;
                    counter!("sync_scheduler_jobs_enqueued_total").increment(1);
                    debug!(project_id = %project.id, job_id = %job.id, "Scheduled full sync");
                }
                Err(err) => {
                    stats.errors += 1;
                    error!(project_id = %project.id, error = %err, "Failed to schedule sync");
                }
            }
        }

        Ok(stats)
    }
}
