//! Risk repository
//!
//! Two match strategies: the embedded delivery risk is found by its reserved
//! source tag, list entries by title.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::mapping::RemoteRisk;
use crate::mapping::delivery::{map_risk_level, map_risk_status};
use crate::models::risk::{ActiveModel, Column, Entity, Model};

use super::action_item::UpsertOutcome;

pub struct RiskRepository<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> RiskRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .order_by_asc(Column::CreatedAt)
            .all(self.conn)
            .await
    }

    pub async fn count_for_project(&self, project_id: Uuid) -> Result<u64, DbErr> {
        Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .count(self.conn)
            .await
    }

    pub async fn find_by_source(&self, project_id: Uuid, source: &str) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .filter(Column::Source.eq(source))
            .one(self.conn)
            .await
    }

    pub async fn find_by_title(&self, project_id: Uuid, title: &str) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .filter(Column::Title.eq(title))
            .one(self.conn)
            .await
    }

    /// Upserts the single risk that lives under the reserved `source` tag.
    pub async fn upsert_by_source(
        &self,
        project_id: Uuid,
        source: &str,
        risk: &RemoteRisk,
    ) -> Result<UpsertOutcome, DbErr> {
        let existing = self.find_by_source(project_id, source).await?;
        self.save(project_id, source, existing, risk).await
    }

    /// Upserts a list entry matched on title within the project.
    pub async fn upsert_by_title(
        &self,
        project_id: Uuid,
        source: &str,
        risk: &RemoteRisk,
    ) -> Result<UpsertOutcome, DbErr> {
        let existing = self.find_by_title(project_id, &risk.title).await?;
        self.save(project_id, source, existing, risk).await
    }

    pub async fn insert_all(&self, risks: Vec<ActiveModel>) -> Result<usize, DbErr> {
        let count = risks.len();
        if count > 0 {
            Entity::insert_many(risks).exec(self.conn).await?;
        }
        Ok(count)
    }

    async fn save(
        &self,
        project_id: Uuid,
        source: &str,
        existing: Option<Model>,
        risk: &RemoteRisk,
    ) -> Result<UpsertOutcome, DbErr> {
        let now = Utc::now().fixed_offset();

        let Some(existing) = existing else {
            let row = ActiveModel {
                id: Set(Uuid::new_v4()),
                project_id: Set(project_id),
                source: Set(Some(source.to_string())),
                identified_date: Set(Some(risk.identified_date.unwrap_or_else(|| now.date_naive()))),
                created_at: Set(now),
                updated_at: Set(now),
                ..apply(<ActiveModel as Default>::default(), risk)
            };
            row.insert(self.conn).await?;
            return Ok(UpsertOutcome::Created);
        };

        if matches_fields(&existing, source, risk) {
            return Ok(UpsertOutcome::Unchanged);
        }

        let mut row = apply(existing.into(), risk);
        if let Some(identified) = risk.identified_date {
            row.identified_date = Set(Some(identified));
        }
        row.source = Set(Some(source.to_string()));
        row.updated_at = Set(now);
        row.update(self.conn).await?;
        Ok(UpsertOutcome::Updated)
    }
}

fn apply(mut row: ActiveModel, risk: &RemoteRisk) -> ActiveModel {
    row.title = Set(risk.title.clone());
    row.description = Set(risk.description.clone());
    row.probability = Set(map_risk_level(risk.probability.as_deref()));
    row.impact = Set(map_risk_level(risk.impact.as_deref()));
    row.status = Set(map_risk_status(risk.status.as_deref()));
    row.category = Set(risk.category.clone());
    row.mitigation_plan = Set(risk.mitigation_plan.clone());
    row.external_id = Set(risk.external_id.clone());
    row
}

/// True when writing `risk` under `source` would not change the row.
fn matches_fields(row: &Model, source: &str, risk: &RemoteRisk) -> bool {
    row.title == risk.title
        && row.description == risk.description
        && row.probability == map_risk_level(risk.probability.as_deref())
        && row.impact == map_risk_level(risk.impact.as_deref())
        && row.status == map_risk_status(risk.status.as_deref())
        && row.category == risk.category
        && row.mitigation_plan == risk.mitigation_plan
        && row.external_id == risk.external_id
        && row.source.as_deref() == Some(source)
        && risk
            .identified_date
            .is_none_or(|identified| row.identified_date == Some(identified))
}
