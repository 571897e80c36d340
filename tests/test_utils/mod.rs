//! Test utilities for database and orchestrator testing.
//!
//! In-memory SQLite with all migrations applied, project fixtures, and an
//! in-process fake adapter that stands in for either remote system.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use project_sync::connectors::{
    ClientFactory, ConnectionStatus, IntegrationError, RemoteClient, RemoteClients, RemoteSystem,
    SprintGoal,
};
use project_sync::mapping::{RemoteFinancials, RemoteIssue, RemoteProject, RemoteRisk};
use project_sync::models::project;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// A minimal project row; callers set link columns as needed.
pub fn project_fixture(name: &str) -> project::ActiveModel {
    let now = Utc::now().fixed_offset();
    project::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
}

pub async fn insert_project(
    db: &DatabaseConnection,
    fixture: project::ActiveModel,
) -> Result<project::Model> {
    Ok(fixture.insert(db).await?)
}

/// Scriptable stand-in for a remote system.
///
/// Everything it returns is configured through the public mutexes; calls to
/// `fetch_issues` record the `since` they were given.
pub struct FakeRemote {
    system: RemoteSystem,
    configured: bool,
    pub project: Mutex<Option<RemoteProject>>,
    pub issues: Mutex<Vec<RemoteIssue>>,
    pub financials: Mutex<Result<Option<RemoteFinancials>, IntegrationError>>,
    pub risks: Mutex<Vec<RemoteRisk>>,
    pub sprint: Mutex<Option<SprintGoal>>,
    pub issue_error: Mutex<Option<IntegrationError>>,
    pub risk_error: Mutex<Option<IntegrationError>>,
    pub since_seen: Mutex<Vec<Option<DateTime<Utc>>>>,
}

impl FakeRemote {
    pub fn new(system: RemoteSystem) -> Self {
        Self {
            system,
            configured: true,
            project: Mutex::new(None),
            issues: Mutex::new(Vec::new()),
            financials: Mutex::new(Ok(None)),
            risks: Mutex::new(Vec::new()),
            sprint: Mutex::new(None),
            issue_error: Mutex::new(None),
            risk_error: Mutex::new(None),
            since_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured(system: RemoteSystem) -> Self {
        Self {
            configured: false,
            ..Self::new(system)
        }
    }

    pub fn with_issues(self, issues: Vec<RemoteIssue>) -> Self {
        *self.issues.lock().unwrap() = issues;
        self
    }

    pub fn with_project(self, remote: RemoteProject) -> Self {
        *self.project.lock().unwrap() = Some(remote);
        self
    }

    pub fn with_financials(self, financials: RemoteFinancials) -> Self {
        *self.financials.lock().unwrap() = Ok(Some(financials));
        self
    }

    pub fn with_risks(self, risks: Vec<RemoteRisk>) -> Self {
        *self.risks.lock().unwrap() = risks;
        self
    }

    pub fn since_seen(&self) -> Vec<Option<DateTime<Utc>>> {
        self.since_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteClient for FakeRemote {
    fn system(&self) -> RemoteSystem {
        self.system
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn fetch_project(&self, _key: &str) -> Result<Option<RemoteProject>, IntegrationError> {
        Ok(self.project.lock().unwrap().clone())
    }

    async fn fetch_issues(
        &self,
        _key: &str,
        since: Option<DateTime<Utc>>,
        max_results: usize,
    ) -> Result<Vec<RemoteIssue>, IntegrationError> {
        self.since_seen.lock().unwrap().push(since);
        if let Some(err) = self.issue_error.lock().unwrap().clone() {
            return Err(err);
        }
        let issues = self.issues.lock().unwrap();
        Ok(issues.iter().take(max_results).cloned().collect())
    }

    async fn fetch_financials(&self, id: &str) -> Result<RemoteFinancials, IntegrationError> {
        self.financials
            .lock()
            .unwrap()
            .clone()
            .map(|f| f.unwrap_or_else(|| RemoteFinancials::empty(id)))
    }

    async fn fetch_risks(&self, _id: &str) -> Result<Vec<RemoteRisk>, IntegrationError> {
        if let Some(err) = self.risk_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.risks.lock().unwrap().clone())
    }

    async fn fetch_sprint_goal(&self, _key: &str) -> Result<Option<SprintGoal>, IntegrationError> {
        Ok(self.sprint.lock().unwrap().clone())
    }

    async fn test_connection(&self) -> ConnectionStatus {
        ConnectionStatus::connected(self.system, Some("fake".to_string()))
    }
}

/// Adapter pair around shared fakes so tests can inspect them afterwards.
pub fn fake_clients(jira: &Arc<FakeRemote>, delivery: &Arc<FakeRemote>) -> RemoteClients {
    RemoteClients::new(jira.clone(), delivery.clone())
}

/// Factory handing out the same fakes on every run.
pub struct FakeFactory {
    pub jira: Arc<FakeRemote>,
    pub delivery: Arc<FakeRemote>,
}

impl ClientFactory for FakeFactory {
    fn create(&self) -> Result<RemoteClients, IntegrationError> {
        Ok(fake_clients(&self.jira, &self.delivery))
    }
}

/// A tracker issue with the fields the mapping layer reads.
pub fn issue(key: &str, summary: &str, updated: &str) -> RemoteIssue {
    RemoteIssue {
        key: key.to_string(),
        summary: summary.to_string(),
        status: Some("In Progress".to_string()),
        priority: Some("High".to_string()),
        issue_type: Some("Task".to_string()),
        updated: DateTime::parse_from_rfc3339(updated).ok(),
        created: DateTime::parse_from_rfc3339("2025-01-01T09:00:00+00:00").ok(),
        ..RemoteIssue::default()
    }
}
