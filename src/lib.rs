//! # Project Sync Library
//!
//! Mirrors issue-tracker and delivery-system data into local projects:
//! remote adapters, the field mapping layer, the sync job ledger, the
//! orchestrator and the background harness that runs it.

pub mod config;
pub mod connectors;
pub mod db;
pub mod error;
pub mod handlers;
pub mod mapping;
pub mod models;
pub mod repositories;
pub mod scheduler;
pub mod server;
pub mod sync;
pub mod sync_executor;
pub mod telemetry;
pub use migration;
