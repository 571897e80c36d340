//! Database migrations for the project sync service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_11_10_000100_create_projects;
mod m2025_11_10_000200_create_action_items;
mod m2025_11_10_000300_create_risks;
mod m2025_11_10_000400_create_sync_jobs;
mod m2025_11_10_000500_add_sync_job_active_guard;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_11_10_000100_create_projects::Migration),
            Box::new(m2025_11_10_000200_create_action_items::Migration),
            Box::new(m2025_11_10_000300_create_risks::Migration),
            Box::new(m2025_11_10_000400_create_sync_jobs::Migration),
            Box::new(m2025_11_10_000500_add_sync_job_active_guard::Migration),
        ]
    }
}
