//! # Repository Layer
//!
//! SeaORM access for the sync tables. The ledger owns its connection; the
//! entity repositories borrow one so they can run inside a transaction.

pub mod action_item;
pub mod project;
pub mod risk;
pub mod sync_job;

pub use action_item::{ActionItemRepository, UpsertOutcome};
pub use project::ProjectRepository;
pub use risk::RiskRepository;
pub use sync_job::{JobCounts, SyncJobRepository};
