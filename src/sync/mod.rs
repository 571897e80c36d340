//! Sync Orchestrator
//!
//! Reconciles one project against both remote systems. Issue sync mirrors
//! tracker issues into action items; delivery sync caches project details,
//! financials and risks. Sub-step failures are folded into the returned
//! [`SubResult`]s; only a missing project aborts an operation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, Set, TransactionTrait};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::connectors::RemoteClients;
use crate::error::SyncError;
use crate::mapping::jira::{extract_project_key, issue_to_fields};
use crate::mapping::{RemoteFinancials, RemoteProject, RemoteRisk, delivery as delivery_mapping};
use crate::models::project;
use crate::models::risk::{EMBEDDED_RISK_SOURCE, REMOTE_LIST_SOURCE};
use crate::models::sync_job::SyncJobKind;
use crate::repositories::{
    ActionItemRepository, ProjectRepository, RiskRepository, SyncJobRepository, UpsertOutcome,
};
use crate::telemetry::current_job_id;

pub mod result;
pub mod synthetic;

pub use result::{JobSummary, KindStatus, SubResult, SyncResult, SyncStatus};

const NOT_REQUESTED: &str = "Not part of this sync";

/// Entry point for all sync passes against one database and one adapter pair.
pub struct SyncService {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
    clients: RemoteClients,
    jobs: SyncJobRepository,
}

impl SyncService {
    pub fn new(db: DatabaseConnection, config: Arc<AppConfig>, clients: RemoteClients) -> Self {
        let jobs = SyncJobRepository::new(db.clone());
        Self {
            db,
            config,
            clients,
            jobs,
        }
    }

    pub fn jobs(&self) -> &SyncJobRepository {
        &self.jobs
    }

    /// Releases the adapters' cached credentials.
    pub async fn close(&self) {
        self.clients.close().await;
    }

    /// Issue sync followed by delivery sync, then stamps `last_synced_at`.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn sync_project(&self, project_id: Uuid) -> Result<SyncResult, SyncError> {
        self.run(project_id, SyncJobKind::Full).await
    }

    /// Runs the passes `kind` stands for. The half a kind does not cover is
    /// reported as skipped.
    pub async fn run(&self, project_id: Uuid, kind: SyncJobKind) -> Result<SyncResult, SyncError> {
        ProjectRepository::new(&self.db).require(project_id).await?;
        info!(
            project_id = %project_id,
            kind = %kind,
            job_id = ?current_job_id(),
            "Starting project sync"
        );

        let (jira, delivery) = match kind {
            SyncJobKind::Jira => (
                self.sync_issues_only(project_id, false).await?,
                SubResult::skipped(NOT_REQUESTED),
            ),
            SyncJobKind::Delivery => (
                SubResult::skipped(NOT_REQUESTED),
                self.sync_delivery_only(project_id).await?,
            ),
            SyncJobKind::Full => {
                let jira = self.sync_issues_only(project_id, false).await?;
                // Re-read inside the delivery pass so it never writes back a stale row.
                let delivery = self.sync_delivery_only(project_id).await?;
                (jira, delivery)
            }
        };

        if let Err(err) = self.touch_last_synced(project_id).await {
            warn!(project_id = %project_id, error = %err, "Failed to update last_synced_at");
        }

        let result = SyncResult {
            project_id,
            timestamp: Utc::now(),
            jira,
            delivery,
        };
        info!(
            project_id = %project_id,
            kind = %kind,
            has_errors = result.has_errors(),
            "Project sync finished"
        );
        Ok(result)
    }

    /// Mirrors tracker issues into action items.
    ///
    /// Incremental unless `force_full` is set or no successful run exists.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn sync_issues_only(
        &self,
        project_id: Uuid,
        force_full: bool,
    ) -> Result<SubResult, SyncError> {
        let project = ProjectRepository::new(&self.db).require(project_id).await?;

        if !project.is_jira_linked() {
            return Ok(SubResult::skipped("No Jira project linked"));
        }
        if !self.clients.jira.is_configured() {
            return Ok(SubResult::skipped("Jira integration not configured"));
        }

        let mut result = SubResult::started();
        if let Err(err) = self.sync_issues(project, force_full, &mut result).await {
            warn!(project_id = %project_id, error = %err, "Issue sync failed");
            result.fail(err.to_string());
        }
        Ok(result)
    }

    /// Caches delivery details, financials and risks.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn sync_delivery_only(&self, project_id: Uuid) -> Result<SubResult, SyncError> {
        let project = ProjectRepository::new(&self.db).require(project_id).await?;
        let synthetic = self.config.sync.synthetic_fallback;

        if !synthetic {
            if !project.is_delivery_linked() {
                return Ok(SubResult::skipped("No delivery record linked"));
            }
            if !self.clients.delivery.is_configured() {
                return Ok(SubResult::skipped("Delivery integration not configured"));
            }
        }

        let mut result = SubResult::started();
        if let Err(err) = self.sync_delivery(project, &mut result).await {
            warn!(project_id = %project_id, error = %err, "Delivery sync failed");
            result.fail(err.to_string());
        }
        Ok(result)
    }

    /// Configuration flags, link flags and per-kind ledger state.
    pub async fn get_status(&self, project_id: Uuid) -> Result<SyncStatus, SyncError> {
        let project = ProjectRepository::new(&self.db).require(project_id).await?;

        let jira = self.kind_status(project_id, SyncJobKind::Jira).await?;
        let delivery = self.kind_status(project_id, SyncJobKind::Delivery).await?;
        let full = self.kind_status(project_id, SyncJobKind::Full).await?;
        let jira_linked = project.is_jira_linked();
        let delivery_linked = project.is_delivery_linked();

        Ok(SyncStatus {
            project_id,
            last_synced_at: project.last_synced_at,
            jira_configured: self.config.jira.is_configured(),
            jira_linked,
            jira_project_key: project.jira_project_key,
            jira_project_name: project.jira_project_name,
            delivery_configured: self.config.delivery.is_configured(),
            delivery_linked,
            delivery_id: project.delivery_id,
            jira,
            delivery,
            full,
        })
    }

    async fn kind_status(&self, project_id: Uuid, kind: SyncJobKind) -> Result<KindStatus, SyncError> {
        Ok(KindStatus {
            active_job: self.jobs.get_active(project_id, kind).await?.map(Into::into),
            last_completed_job: self
                .jobs
                .get_last_completed(project_id, kind)
                .await?
                .map(Into::into),
        })
    }

    async fn sync_issues(
        &self,
        project: project::Model,
        force_full: bool,
        result: &mut SubResult,
    ) -> Result<(), SyncError> {
        let (project, key) = self.resolve_jira_key(project).await?;
        let since = if force_full {
            None
        } else {
            self.incremental_since(project.id).await?
        };
        let limit = self.config.sync.issue_limit(self.config.jira.max_results);

        // Everything remote is fetched before the transaction opens.
        let issues = self.clients.jira.fetch_issues(&key, since, limit).await?;
        debug!(project_key = %key, fetched = issues.len(), ?since, "Fetched issues");

        let mut changes: project::ActiveModel = project.clone().into();
        let mut project_changed = false;

        if project.jira_project_name.is_none() {
            match self.clients.jira.fetch_project(&key).await {
                Ok(Some(remote)) => {
                    changes.jira_project_name = Set(remote.name);
                    project_changed = true;
                }
                Ok(None) => result.notes.push(format!("Jira project {key} not found")),
                Err(err) => {
                    warn!(project_key = %key, error = %err, "Project name lookup failed");
                    result.notes.push(format!("Project name lookup failed: {err}"));
                }
            }
        }

        let mut goal_synced = false;
        if self.config.jira.fetch_sprint_goal {
            match self.clients.jira.fetch_sprint_goal(&key).await {
                Ok(Some(sprint)) => {
                    changes.jira_board_id = Set(Some(sprint.board_id));
                    goal_synced = sprint.goal.is_some();
                    if goal_synced {
                        changes.sprint_goal = Set(sprint.goal);
                    }
                    project_changed = true;
                }
                Ok(None) => debug!(project_key = %key, "No board for project"),
                Err(err) => {
                    warn!(project_key = %key, error = %err, "Sprint goal lookup failed");
                    result.notes.push(format!("Sprint goal lookup failed: {err}"));
                }
            }
        }

        let txn = self.db.begin().await?;
        let mut last_updated: Option<DateTime<Utc>> = None;

        for issue in &issues {
            let fields = match issue_to_fields(issue) {
                Ok(fields) => fields,
                Err(err) => {
                    warn!(issue_key = %issue.key, error = %err, "Skipping issue");
                    result.notes.push(err.to_string());
                    continue;
                }
            };

            let savepoint = txn.begin().await?;
            match ActionItemRepository::new(&savepoint)
                .upsert(project.id, &issue.key, &fields)
                .await
            {
                Ok(outcome) => {
                    savepoint.commit().await?;
                    result.items_synced += 1;
                    match outcome {
                        UpsertOutcome::Created => result.items_created += 1,
                        UpsertOutcome::Updated => result.items_updated += 1,
                        UpsertOutcome::Unchanged => {}
                    }
                    if let Some(updated) = fields.remote_updated_at.map(|ts| ts.with_timezone(&Utc)) {
                        last_updated = Some(last_updated.map_or(updated, |seen| seen.max(updated)));
                    }
                }
                Err(err) => {
                    savepoint.rollback().await?;
                    warn!(issue_key = %issue.key, error = %err, "Failed to upsert issue");
                    result.notes.push(format!("{}: {}", issue.key, err));
                }
            }
        }

        if project_changed {
            changes.updated_at = Set(Utc::now().fixed_offset());
            ProjectRepository::new(&txn).update(changes).await?;
        }

        txn.commit().await?;

        // Present on every committed pass, so the ledger can tell a job whose
        // issue pass ran from one where it was skipped.
        result.cursor = Some(json!({
            "last_updated": last_updated.map(|ts| ts.to_rfc3339()),
        }));
        let mut message = format!("Synced {} issues", result.items_synced);
        if goal_synced {
            message.push_str(" and sprint goal");
        }
        result.message = Some(message);

        info!(
            project_id = %project.id,
            project_key = %key,
            synced = result.items_synced,
            created = result.items_created,
            updated = result.items_updated,
            skipped = result.notes.len(),
            "Issue sync committed"
        );
        Ok(())
    }

    /// The stored key, or one parsed from the project URL and persisted at once.
    async fn resolve_jira_key(
        &self,
        project: project::Model,
    ) -> Result<(project::Model, String), SyncError> {
        if let Some(key) = project.jira_project_key.clone() {
            return Ok((project, key));
        }

        let url = project.jira_url.as_deref().unwrap_or_default();
        let key = extract_project_key(url).ok_or_else(|| {
            SyncError::Validation(format!("no Jira project key found in URL '{url}'"))
        })?;

        let mut changes: project::ActiveModel = project.into();
        changes.jira_project_key = Set(Some(key.clone()));
        changes.updated_at = Set(Utc::now().fixed_offset());
        let project = ProjectRepository::new(&self.db).update(changes).await?;

        info!(project_id = %project.id, project_key = %key, "Resolved Jira project key from URL");
        Ok((project, key))
    }

    /// Completion of the last successful job whose issue pass actually ran,
    /// minus the backfill margin. `None` means fetch everything.
    async fn incremental_since(&self, project_id: Uuid) -> Result<Option<DateTime<Utc>>, SyncError> {
        let last = self
            .jobs
            .get_last_successful_with_cursor(project_id, SyncJobKind::Jira)
            .await?;
        let margin = Duration::minutes(self.config.sync.backfill_margin_minutes);
        Ok(last
            .and_then(|job| job.completed_at)
            .map(|completed| completed.with_timezone(&Utc) - margin))
    }

    async fn sync_delivery(
        &self,
        project: project::Model,
        result: &mut SubResult,
    ) -> Result<(), SyncError> {
        let remote_enabled = self.clients.delivery.is_configured();
        let synthetic = self.config.sync.synthetic_fallback;
        let mut errors: Vec<String> = Vec::new();
        let mut parts: Vec<String> = Vec::new();

        if !remote_enabled {
            result.notes.push("Delivery integration not configured".to_string());
        }

        let (project, record_id) = self.resolve_delivery_id(project, &mut errors).await?;
        let fetched = match record_id.filter(|_| remote_enabled) {
            Some(id) => self.fetch_delivery(&id, &mut errors).await,
            None => DeliveryFetch::default(),
        };

        let mut changes: project::ActiveModel = project.clone().into();

        // Project details
        if let Some(remote) = fetched.project.as_ref() {
            apply_project_details(&project, remote, &mut changes);
            result.items_synced += 1;
        }

        // Financials
        let mut financials_updated = false;
        match fetched.financials.as_ref().filter(|f| f.has_any_data()) {
            Some(remote) => {
                apply_financials(remote, &mut changes);
                financials_updated = true;
                parts.push("Synced financials".to_string());
            }
            None if synthetic && !fetched.financials_failed && !project.has_cached_budget() => {
                let budget = synthetic::budget(&mut rand::thread_rng());
                info!(project_id = %project.id, total = budget.total, "Generated synthetic financials");
                changes.currency = Set(Some(budget.currency));
                changes.total_budget = Set(Some(budget.total));
                changes.spent_budget = Set(Some(budget.spent));
                changes.remaining_budget = Set(Some(budget.remaining));
                financials_updated = true;
                parts.push("Generated synthetic financials".to_string());
            }
            None => {}
        }

        // Timeline
        if synthetic {
            let today = Utc::now().date_naive();
            let remote = fetched.project.as_ref();
            let start_known =
                project.start_date.is_some() || remote.is_some_and(|r| r.start_date.is_some());
            let end_known =
                project.end_date.is_some() || remote.is_some_and(|r| r.end_date.is_some());
            if !start_known {
                changes.start_date = Set(Some(synthetic::start_date(&mut rand::thread_rng(), today)));
            }
            if !end_known {
                changes.end_date = Set(Some(synthetic::end_date(&mut rand::thread_rng(), today)));
            }
            if !start_known || !end_known {
                result.notes.push("Generated synthetic delivery dates".to_string());
            }
        }

        let txn = self.db.begin().await?;
        changes.updated_at = Set(Utc::now().fixed_offset());
        ProjectRepository::new(&txn).update(changes).await?;

        let batch = RiskBatch {
            embedded: fetched.project.and_then(|remote| remote.embedded_risk),
            listed: fetched.risks,
            listed_failed: fetched.risks_failed,
        };
        if let Some(part) = self
            .write_risks(&txn, project.id, batch, result, &mut errors)
            .await?
        {
            parts.push(part);
        }

        txn.commit().await?;

        result.financials_updated = financials_updated;
        if !parts.is_empty() {
            result.message = Some(parts.join(", "));
        }
        if !errors.is_empty() {
            result.fail(errors.join("; "));
        }

        info!(
            project_id = %project.id,
            financials_updated = result.financials_updated,
            risks_synced = result.risks_synced,
            errors = errors.len(),
            "Delivery sync committed"
        );
        Ok(())
    }

    /// All remote delivery reads for one record. Failures land in `errors`.
    async fn fetch_delivery(&self, id: &str, errors: &mut Vec<String>) -> DeliveryFetch {
        let mut fetched = DeliveryFetch::default();

        match self.clients.delivery.fetch_project(id).await {
            Ok(Some(remote)) => fetched.project = Some(remote),
            Ok(None) => errors.push(format!("Delivery record {id} not found")),
            Err(err) => errors.push(format!("Project lookup failed: {err}")),
        }

        match self.clients.delivery.fetch_financials(id).await {
            Ok(remote) => fetched.financials = Some(remote),
            Err(err) => {
                fetched.financials_failed = true;
                errors.push(format!("Financials sync failed: {err}"));
            }
        }

        match self.clients.delivery.fetch_risks(id).await {
            Ok(risks) => fetched.risks = risks,
            Err(err) => {
                fetched.risks_failed = true;
                errors.push(format!("Risk sync failed: {err}"));
            }
        }

        fetched
    }

    /// Reconciles risks inside `txn`, one savepoint per write so a failed
    /// statement never poisons the project update. Returns a message
    /// fragment when anything was written.
    async fn write_risks(
        &self,
        txn: &DatabaseTransaction,
        project_id: Uuid,
        batch: RiskBatch,
        result: &mut SubResult,
        errors: &mut Vec<String>,
    ) -> Result<Option<String>, SyncError> {
        let RiskBatch {
            embedded,
            listed,
            listed_failed,
        } = batch;
        let remote_seen = usize::from(embedded.is_some()) + listed.len();

        if let Some(risk) = embedded {
            let savepoint = txn.begin().await?;
            match RiskRepository::new(&savepoint)
                .upsert_by_source(project_id, EMBEDDED_RISK_SOURCE, &risk)
                .await
            {
                Ok(outcome) => {
                    savepoint.commit().await?;
                    record_risk(result, outcome);
                }
                Err(err) => {
                    savepoint.rollback().await?;
                    warn!(risk_title = %risk.title, error = %err, "Failed to upsert embedded risk");
                    errors.push(format!("Risk sync failed: {err}"));
                }
            }
        }

        for risk in &listed {
            let savepoint = txn.begin().await?;
            match RiskRepository::new(&savepoint)
                .upsert_by_title(project_id, REMOTE_LIST_SOURCE, risk)
                .await
            {
                Ok(outcome) => {
                    savepoint.commit().await?;
                    record_risk(result, outcome);
                }
                Err(err) => {
                    savepoint.rollback().await?;
                    warn!(risk_title = %risk.title, error = %err, "Failed to upsert risk");
                    result.notes.push(format!("Risk '{}': {}", risk.title, err));
                }
            }
        }

        if remote_seen > 0 {
            return Ok(Some(format!("Synced {} risks", result.risks_synced)));
        }
        // A failed remote list is reported, never papered over
        if !self.config.sync.synthetic_fallback || listed_failed {
            return Ok(None);
        }

        let savepoint = txn.begin().await?;
        let repo = RiskRepository::new(&savepoint);
        let inserted = match repo.count_for_project(project_id).await {
            Ok(0) => {
                let risks = synthetic::risks(&mut rand::thread_rng(), project_id);
                repo.insert_all(risks).await.map(Some)
            }
            Ok(_) => Ok(None),
            Err(err) => Err(err),
        };
        match inserted {
            Ok(Some(inserted)) => {
                savepoint.commit().await?;
                result.risks_synced += inserted as i32;
                result.items_created += inserted as i32;
                info!(project_id = %project_id, inserted, "Generated synthetic risks");
                Ok(Some(format!("Generated {inserted} synthetic risks")))
            }
            Ok(None) => {
                savepoint.commit().await?;
                Ok(None)
            }
            Err(err) => {
                savepoint.rollback().await?;
                warn!(project_id = %project_id, error = %err, "Failed to generate synthetic risks");
                errors.push(format!("Risk sync failed: {err}"));
                Ok(None)
            }
        }
    }

    /// The stored record id, or one parsed from the delivery URL and
    /// persisted at once. `None` when the project has neither or the URL
    /// does not parse; the latter is reported through `errors`.
    async fn resolve_delivery_id(
        &self,
        project: project::Model,
        errors: &mut Vec<String>,
    ) -> Result<(project::Model, Option<String>), SyncError> {
        if let Some(id) = project.delivery_id.clone() {
            return Ok((project, Some(id)));
        }
        let Some(url) = project.delivery_url.clone() else {
            return Ok((project, None));
        };

        let Some(id) = delivery_mapping::extract_id_from_url(&url) else {
            warn!(project_id = %project.id, %url, "Delivery URL has no record id");
            errors.push(format!("no delivery record id found in URL '{url}'"));
            return Ok((project, None));
        };

        let mut changes: project::ActiveModel = project.into();
        changes.delivery_id = Set(Some(id.clone()));
        changes.updated_at = Set(Utc::now().fixed_offset());
        let project = ProjectRepository::new(&self.db).update(changes).await?;

        info!(project_id = %project.id, delivery_id = %id, "Resolved delivery record id from URL");
        Ok((project, Some(id)))
    }

    async fn touch_last_synced(&self, project_id: Uuid) -> Result<(), DbErr> {
        let now = Utc::now().fixed_offset();
        let changes = project::ActiveModel {
            id: sea_orm::ActiveValue::Unchanged(project_id),
            last_synced_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        };
        ProjectRepository::new(&self.db).update(changes).await?;
        Ok(())
    }
}

/// Remote delivery reads, gathered before any write.
#[derive(Default)]
struct DeliveryFetch {
    project: Option<RemoteProject>,
    financials: Option<RemoteFinancials>,
    financials_failed: bool,
    risks: Vec<RemoteRisk>,
    risks_failed: bool,
}

struct RiskBatch {
    embedded: Option<RemoteRisk>,
    listed: Vec<RemoteRisk>,
    listed_failed: bool,
}

fn record_risk(result: &mut SubResult, outcome: UpsertOutcome) {
    result.risks_synced += 1;
    result.items_synced += 1;
    match outcome {
        UpsertOutcome::Created => result.items_created += 1,
        UpsertOutcome::Updated => result.items_updated += 1,
        UpsertOutcome::Unchanged => {}
    }
}

fn apply_project_details(
    project: &project::Model,
    remote: &RemoteProject,
    changes: &mut project::ActiveModel,
) {
    if project.name.trim().is_empty()
        && let Some(name) = remote.name.clone()
    {
        changes.name = Set(name);
    }
    if remote.client_name.is_some() {
        changes.client_name = Set(remote.client_name.clone());
    }
    if remote.status.is_some() {
        changes.delivery_status = Set(remote.status.clone());
    }
    if remote.category.is_some() {
        changes.project_category = Set(remote.category.clone());
    }
    if remote.start_date.is_some() {
        changes.start_date = Set(remote.start_date);
    }
    if remote.end_date.is_some() {
        changes.end_date = Set(remote.end_date);
    }
    if !remote.health.is_empty() {
        changes.health_overall = Set(remote.health.overall.clone());
        changes.health_time = Set(remote.health.time.clone());
        changes.health_cost = Set(remote.health.cost.clone());
        changes.health_resources = Set(remote.health.resources.clone());
        changes.health_summary = Set(remote.health.summary.clone());
    }
}

/// Copies every figure the remote side reported. The three budget figures
/// always come from the remote record as a set, so a total that cannot be
/// derived is cleared rather than left over from an earlier source.
fn apply_financials(remote: &RemoteFinancials, changes: &mut project::ActiveModel) {
    changes.currency = Set(Some(remote.currency.clone()));
    if remote.fte_day_price.is_some() {
        changes.fte_day_price = Set(remote.fte_day_price);
    }
    if remote.total_fte_days.is_some() {
        changes.total_fte_days = Set(remote.total_fte_days);
    }
    if remote.overrun_investment.is_some() {
        changes.overrun_investment = Set(remote.overrun_investment);
    }
    changes.total_budget = Set(remote.total_budget());
    changes.spent_budget = Set(remote.spent_budget());
    changes.remaining_budget = Set(remote.remaining_budget);
}
