//! Action item repository
//!
//! Upserts mirrored issues keyed on `(project_id, jira_key)`. Works against
//! any connection so the orchestrator can run it inside its transaction.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::mapping::jira::ActionFields;
use crate::models::action_item::{ActiveModel, Column, Entity, Model};

/// What an upsert did to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

pub struct ActionItemRepository<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> ActionItemRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn find_by_key(&self, project_id: Uuid, jira_key: &str) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .filter(Column::JiraKey.eq(jira_key))
            .one(self.conn)
            .await
    }

    pub async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .order_by_asc(Column::JiraKey)
            .all(self.conn)
            .await
    }

    pub async fn count_for_project(&self, project_id: Uuid) -> Result<u64, DbErr> {
        Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .count(self.conn)
            .await
    }

    /// Overwrites every mirrored field, or inserts when the key is new.
    ///
    /// A row whose mirrored fields already equal `fields` is left untouched.
    pub async fn upsert(
        &self,
        project_id: Uuid,
        jira_key: &str,
        fields: &ActionFields,
    ) -> Result<UpsertOutcome, DbErr> {
        let now = Utc::now().fixed_offset();

        let Some(existing) = self.find_by_key(project_id, jira_key).await? else {
            let item = ActiveModel {
                id: Set(Uuid::new_v4()),
                project_id: Set(project_id),
                jira_key: Set(jira_key.to_string()),
                created_at: Set(now),
                updated_at: Set(now),
                ..apply(<ActiveModel as Default>::default(), fields)
            };
            item.insert(self.conn).await?;
            return Ok(UpsertOutcome::Created);
        };

        if matches_fields(&existing, fields) {
            return Ok(UpsertOutcome::Unchanged);
        }

        let mut item = apply(existing.into(), fields);
        item.updated_at = Set(now);
        item.update(self.conn).await?;
        Ok(UpsertOutcome::Updated)
    }
}

fn apply(mut item: ActiveModel, fields: &ActionFields) -> ActiveModel {
    item.title = Set(fields.title.clone());
    item.description = Set(fields.description.clone());
    item.status = Set(fields.status);
    item.priority = Set(fields.priority);
    item.issue_type = Set(fields.issue_type.clone());
    item.assignee = Set(fields.assignee.clone());
    item.due_date = Set(fields.due_date);
    item.remote_created_at = Set(fields.remote_created_at);
    item.remote_updated_at = Set(fields.remote_updated_at);
    item
}

fn matches_fields(item: &Model, fields: &ActionFields) -> bool {
    item.title == fields.title
        && item.description == fields.description
        && item.status == fields.status
        && item.priority == fields.priority
        && item.issue_type == fields.issue_type
        && item.assignee == fields.assignee
        && item.due_date == fields.due_date
        && same_instant(item.remote_created_at, fields.remote_created_at)
        && same_instant(item.remote_updated_at, fields.remote_updated_at)
}

/// Stores may hand timestamps back in a different offset than they went in.
fn same_instant<Tz: chrono::TimeZone>(
    stored: Option<chrono::DateTime<Tz>>,
    incoming: Option<chrono::DateTime<Tz>>,
) -> bool {
    match (stored, incoming) {
        (Some(a), Some(b)) => a.timestamp_millis() == b.timestamp_millis(),
        (None, None) => true,
        _ => false,
    }
}
