//! Background harness and scheduler tests.

use std::sync::Arc;

use anyhow::Result;
use project_sync::config::AppConfig;
use project_sync::connectors::{ClientFactory, IntegrationError, RemoteClients, RemoteSystem};
use project_sync::models::sync_job::{SyncJobKind, SyncJobStatus};
use project_sync::repositories::{JobCounts, SyncJobRepository};
use project_sync::scheduler::{SCHEDULER_REQUESTER, SyncScheduler, TickStats};
use project_sync::models::project;
use project_sync::sync_executor::{INTERRUPTED_MESSAGE, SyncExecutor};
use sea_orm::{ActiveModelTrait, ActiveValue, DatabaseConnection, Set};

mod test_utils;
use test_utils::{FakeFactory, FakeRemote, insert_project, issue, project_fixture, setup_test_db};

struct PanickingFactory;

impl ClientFactory for PanickingFactory {
    fn create(&self) -> Result<RemoteClients, IntegrationError> {
        panic!("adapter construction blew up")
    }
}

struct BrokenFactory;

impl ClientFactory for BrokenFactory {
    fn create(&self) -> Result<RemoteClients, IntegrationError> {
        Err(IntegrationError::Transport {
            system: RemoteSystem::Delivery,
            message: "tls backend unavailable".to_string(),
        })
    }
}

fn executor_with(db: &DatabaseConnection, factory: Arc<dyn ClientFactory>) -> SyncExecutor {
    SyncExecutor::new(db.clone(), Arc::new(AppConfig::default()), factory)
}

fn fake_factory(jira: FakeRemote) -> Arc<FakeFactory> {
    Arc::new(FakeFactory {
        jira: Arc::new(jira),
        delivery: Arc::new(FakeRemote::new(RemoteSystem::Delivery)),
    })
}

async fn linked_project(db: &DatabaseConnection, key: &str) -> Result<uuid::Uuid> {
    let mut fixture = project_fixture(key);
    fixture.jira_project_key = Set(Some(key.to_string()));
    Ok(insert_project(db, fixture).await?.id)
}

#[tokio::test]
async fn run_job_records_success_with_counts_and_cursor() -> Result<()> {
    let db = setup_test_db().await?;
    let project_id = linked_project(&db, "OPS").await?;
    let jira = FakeRemote::new(RemoteSystem::Jira).with_issues(vec![
        issue("OPS-1", "Rotate keys", "2025-05-01T12:00:00+00:00"),
        issue("OPS-2", "Patch hosts", "2025-05-03T12:00:00+00:00"),
    ]);
    let executor = executor_with(&db, fake_factory(jira));

    let (job, _) = executor
        .ledger()
        .enqueue_or_get_existing(project_id, SyncJobKind::Jira, Some("tester"))
        .await?;
    let result = executor.run_job(job.id, SyncJobKind::Jira).await.unwrap();
    assert!(!result.has_errors());

    let stored = executor.ledger().get(job.id).await?.unwrap();
    assert_eq!(stored.status, SyncJobStatus::Succeeded);
    assert_eq!(stored.items_synced, 2);
    assert_eq!(stored.items_created, 2);
    assert!(stored.started_at.is_some());
    assert!(stored.completed_at.is_some());
    assert_eq!(
        stored.cursor.as_ref().and_then(|c| c["last_updated"].as_str()),
        Some("2025-05-03T12:00:00+00:00")
    );
    Ok(())
}

#[tokio::test]
async fn run_job_records_sub_result_errors_as_failure() -> Result<()> {
    let db = setup_test_db().await?;
    let project_id = linked_project(&db, "OPS").await?;
    let jira = FakeRemote::new(RemoteSystem::Jira);
    *jira.issue_error.lock().unwrap() = Some(IntegrationError::Http {
        system: RemoteSystem::Jira,
        status: 503,
        message: "maintenance".to_string(),
    });
    let executor = executor_with(&db, fake_factory(jira));

    let (job, _) = executor
        .ledger()
        .enqueue_or_get_existing(project_id, SyncJobKind::Jira, None)
        .await?;
    let result = executor.run_job(job.id, SyncJobKind::Jira).await.unwrap();
    assert!(result.has_errors());

    let stored = executor.ledger().get(job.id).await?.unwrap();
    assert_eq!(stored.status, SyncJobStatus::Failed);
    let error = stored.error.unwrap();
    assert!(error.starts_with("jira: "));
    assert!(error.contains("503"));
    assert!(stored.completed_at.is_some());
    Ok(())
}

#[tokio::test]
async fn run_job_fails_the_job_when_adapters_cannot_be_built() -> Result<()> {
    let db = setup_test_db().await?;
    let project_id = linked_project(&db, "OPS").await?;
    let executor = executor_with(&db, Arc::new(BrokenFactory));

    let (job, _) = executor
        .ledger()
        .enqueue_or_get_existing(project_id, SyncJobKind::Delivery, None)
        .await?;
    assert!(executor.run_job(job.id, SyncJobKind::Delivery).await.is_none());

    let stored = executor.ledger().get(job.id).await?.unwrap();
    assert_eq!(stored.status, SyncJobStatus::Failed);
    assert!(stored.error.unwrap().contains("tls backend unavailable"));
    Ok(())
}

#[tokio::test]
async fn run_job_leaves_terminal_jobs_alone() -> Result<()> {
    let db = setup_test_db().await?;
    let project_id = linked_project(&db, "OPS").await?;
    let executor = executor_with(&db, fake_factory(FakeRemote::new(RemoteSystem::Jira)));
    let ledger = SyncJobRepository::new(db.clone());

    let (job, _) = ledger
        .enqueue_or_get_existing(project_id, SyncJobKind::Jira, None)
        .await?;
    ledger.mark_running(job.id).await?;
    ledger
        .mark_failed(job.id, "first attempt", JobCounts::default())
        .await?;

    assert!(executor.run_job(job.id, SyncJobKind::Jira).await.is_none());

    let stored = ledger.get(job.id).await?.unwrap();
    assert_eq!(stored.status, SyncJobStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("first attempt"));
    Ok(())
}

#[tokio::test]
async fn spawned_job_outlives_its_caller() -> Result<()> {
    let db = setup_test_db().await?;
    let project_id = linked_project(&db, "OPS").await?;
    let executor = executor_with(&db, fake_factory(FakeRemote::new(RemoteSystem::Jira)));

    let (job, _) = executor
        .ledger()
        .enqueue_or_get_existing(project_id, SyncJobKind::Full, None)
        .await?;
    let handle = executor.spawn(&job);
    drop(executor);

    let result = handle.await?.unwrap();
    assert_eq!(result.project_id, project_id);

    let stored = SyncJobRepository::new(db.clone()).get(job.id).await?.unwrap();
    assert_eq!(stored.status, SyncJobStatus::Succeeded);
    Ok(())
}

#[tokio::test]
async fn scheduler_tick_enqueues_linked_projects_once() -> Result<()> {
    let db = setup_test_db().await?;
    let busy = linked_project(&db, "BUSY").await?;
    let idle = linked_project(&db, "IDLE").await?;
    insert_project(&db, project_fixture("Not linked")).await?;

    let executor = executor_with(&db, fake_factory(FakeRemote::new(RemoteSystem::Jira)));
    let (in_flight, _) = executor
        .ledger()
        .enqueue_or_get_existing(busy, SyncJobKind::Full, Some("someone"))
        .await?;
    executor.ledger().mark_running(in_flight.id).await?;

    let scheduler = SyncScheduler::new(Arc::new(AppConfig::default()), executor.clone());
    let stats = scheduler.tick().await?;

    assert_eq!(
        stats,
        TickStats {
            projects_polled: 2,
            jobs_enqueued: 1,
            jobs_deduplicated: 1,
            errors: 0,
        }
    );

    let jobs = executor.ledger().list_for_project(busy, 10).await?;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].requested_by.as_deref(), Some("someone"));

    let jobs = executor.ledger().list_for_project(idle, 10).await?;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, SyncJobKind::Full);
    assert_eq!(jobs[0].requested_by.as_deref(), Some(SCHEDULER_REQUESTER));
    Ok(())
}

#[tokio::test]
async fn scheduler_stops_on_cancellation() -> Result<()> {
    let db = setup_test_db().await?;
    let executor = executor_with(&db, fake_factory(FakeRemote::new(RemoteSystem::Jira)));
    let scheduler = SyncScheduler::new(Arc::new(AppConfig::default()), executor);

    let shutdown = tokio_util::sync::CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(shutdown.clone()));
    shutdown.cancel();

    tokio::time::timeout(std::time::Duration::from_secs(5), handle).await??;
    Ok(())
}

#[tokio::test]
async fn panicking_run_is_recorded_as_failed() -> Result<()> {
    let db = setup_test_db().await?;
    let project_id = linked_project(&db, "OPS").await?;
    let executor = executor_with(&db, Arc::new(PanickingFactory));

    let (job, _) = executor
        .ledger()
        .enqueue_or_get_existing(project_id, SyncJobKind::Jira, None)
        .await?;
    assert!(executor.spawn(&job).await?.is_none());

    let stored = executor.ledger().get(job.id).await?.unwrap();
    assert_eq!(stored.status, SyncJobStatus::Failed);
    assert!(stored.error.unwrap().contains("aborted"));

    // The guard no longer blocks a retry
    let (_, deduplicated) = executor
        .ledger()
        .enqueue_or_get_existing(project_id, SyncJobKind::Jira, None)
        .await?;
    assert!(!deduplicated);
    Ok(())
}

#[tokio::test]
async fn recover_fails_running_jobs_and_resumes_queued_ones() -> Result<()> {
    let db = setup_test_db().await?;
    let stuck = linked_project(&db, "STUCK").await?;
    let waiting = linked_project(&db, "WAIT").await?;
    let executor = executor_with(&db, fake_factory(FakeRemote::new(RemoteSystem::Jira)));
    let ledger = executor.ledger();

    let (running, _) = ledger
        .enqueue_or_get_existing(stuck, SyncJobKind::Jira, None)
        .await?;
    ledger.mark_running(running.id).await?;
    let (queued, _) = ledger
        .enqueue_or_get_existing(waiting, SyncJobKind::Jira, None)
        .await?;

    let recovery = executor.recover().await?;
    assert_eq!(recovery.interrupted, vec![running.id]);
    assert_eq!(recovery.resumed.len(), 1);
    for handle in recovery.resumed {
        handle.await?;
    }

    let failed = ledger.get(running.id).await?.unwrap();
    assert_eq!(failed.status, SyncJobStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some(INTERRUPTED_MESSAGE));

    let resumed = ledger.get(queued.id).await?.unwrap();
    assert_eq!(resumed.status, SyncJobStatus::Succeeded);

    assert!(ledger.list_active().await?.is_empty());
    assert!(executor.recover().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn full_job_with_skipped_issue_pass_does_not_anchor_later_fetches() -> Result<()> {
    let db = setup_test_db().await?;
    let project = insert_project(&db, project_fixture("Delivery first")).await?;
    let factory = fake_factory(FakeRemote::new(RemoteSystem::Jira));
    let executor = executor_with(&db, factory.clone());

    let (full, _) = executor
        .ledger()
        .enqueue_or_get_existing(project.id, SyncJobKind::Full, None)
        .await?;
    let result = executor.run_job(full.id, SyncJobKind::Full).await.unwrap();
    assert_eq!(result.jira.message.as_deref(), Some("No Jira project linked"));
    let full = executor.ledger().get(full.id).await?.unwrap();
    assert_eq!(full.status, SyncJobStatus::Succeeded);
    assert!(full.cursor.is_none());

    // Linked to Jira only now
    project::ActiveModel {
        id: ActiveValue::Unchanged(project.id),
        jira_project_key: Set(Some("LATE".to_string())),
        ..Default::default()
    }
    .update(&db)
    .await?;

    for _ in 0..2 {
        let (job, _) = executor
            .ledger()
            .enqueue_or_get_existing(project.id, SyncJobKind::Jira, None)
            .await?;
        executor.run_job(job.id, SyncJobKind::Jira).await.unwrap();
    }

    let seen = factory.jira.since_seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], None, "first issue fetch must be a full one");
    assert!(seen[1].is_some());
    Ok(())
}
