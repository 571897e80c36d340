//! Project entity model
//!
//! The sync-relevant projection of a project row: external identifiers for
//! both remote systems plus the fields the orchestrator caches from them.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub name: String,

    /// Link to the issue-tracker project, parsed for the key when it is unset
    pub jira_url: Option<String>,
    pub jira_project_key: Option<String>,
    pub jira_project_name: Option<String>,
    pub jira_board_id: Option<i64>,

    /// Link to the delivery record, parsed for the record id when it is unset
    pub delivery_url: Option<String>,
    pub delivery_id: Option<String>,

    pub client_name: Option<String>,
    pub delivery_status: Option<String>,
    pub project_category: Option<String>,

    // Health indicators cached from the delivery record
    pub health_overall: Option<String>,
    pub health_time: Option<String>,
    pub health_cost: Option<String>,
    pub health_resources: Option<String>,
    pub health_summary: Option<String>,

    // Financial aggregates
    pub currency: Option<String>,
    pub total_budget: Option<f64>,
    pub spent_budget: Option<f64>,
    pub remaining_budget: Option<f64>,
    pub fte_day_price: Option<f64>,
    pub total_fte_days: Option<f64>,
    pub overrun_investment: Option<f64>,

    pub start_date: Option<Date>,
    pub end_date: Option<Date>,

    /// Goal of the active sprint on the project's first board
    pub sprint_goal: Option<String>,

    pub last_synced_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::action_item::Entity")]
    ActionItems,
    #[sea_orm(has_many = "super::risk::Entity")]
    Risks,
    #[sea_orm(has_many = "super::sync_job::Entity")]
    SyncJobs,
}

impl Related<super::action_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ActionItems.def()
    }
}

impl Related<super::risk::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Risks.def()
    }
}

impl Related<super::sync_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncJobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// True when any cached budget figure is already present.
    pub fn has_cached_budget(&self) -> bool {
        self.total_budget.is_some() || self.spent_budget.is_some()
            || self.remaining_budget.is_some()
    }

    /// True when the project can be matched to an issue-tracker project.
    pub fn is_jira_linked(&self) -> bool {
        self.jira_project_key.is_some() || self.jira_url.is_some()
    }

    /// True when the project can be matched to a delivery record.
    pub fn is_delivery_linked(&self) -> bool {
        self.delivery_id.is_some() || self.delivery_url.is_some()
    }
}
