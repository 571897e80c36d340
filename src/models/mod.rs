//! # Data Models
//!
//! SeaORM entities touched by the sync subsystem.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod action_item;
pub mod project;
pub mod risk;
pub mod sync_job;

pub use action_item::Entity as ActionItem;
pub use project::Entity as Project;
pub use risk::Entity as Risk;
pub use sync_job::Entity as SyncJob;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "project-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
