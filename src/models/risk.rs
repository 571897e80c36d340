//! Risk entity model
//!
//! Risks reach this table three ways: the single risk indicator embedded on
//! the delivery record (matched by [`EMBEDDED_RISK_SOURCE`]), an enumerable
//! remote risk list (matched by title), or the synthetic fallback.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Reserved source tag for the risk mirrored from the delivery record itself.
pub const EMBEDDED_RISK_SOURCE: &str = "delivery";

/// Source tag for risks mirrored from an enumerable remote risk list.
pub const REMOTE_LIST_SOURCE: &str = "delivery_list";

/// Source tag for risks produced by the synthetic fallback.
pub const SYNTHETIC_SOURCE: &str = "synthetic";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "risks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub probability: RiskLevel,
    pub impact: RiskLevel,
    pub status: RiskStatus,
    pub category: Option<String>,
    pub mitigation_plan: Option<String>,
    pub source: Option<String>,
    pub external_id: Option<String>,
    pub identified_date: Option<Date>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "medium")]
    #[default]
    Medium,
    #[sea_orm(string_value = "low")]
    Low,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum RiskStatus {
    #[sea_orm(string_value = "open")]
    #[default]
    Open,
    #[sea_orm(string_value = "mitigated")]
    Mitigated,
    #[sea_orm(string_value = "closed")]
    Closed,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id",
        on_delete = "Cascade"
    )]
    Project,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
