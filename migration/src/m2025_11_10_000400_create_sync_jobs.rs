//! Migration to create the sync_jobs table.
//!
//! Every sync attempt gets one row; rows are never deleted and double as the
//! sync history for a project.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncJobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncJobs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SyncJobs::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(SyncJobs::Kind).text().not_null())
                    .col(
                        ColumnDef::new(SyncJobs::Status)
                            .text()
                            .not_null()
                            .default("queued"),
                    )
                    .col(ColumnDef::new(SyncJobs::RequestedBy).text().null())
                    .col(ColumnDef::new(SyncJobs::Error).text().null())
                    .col(
                        ColumnDef::new(SyncJobs::ItemsSynced)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::ItemsCreated)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::ItemsUpdated)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SyncJobs::Cursor).json_binary().null())
                    .col(
                        ColumnDef::new(SyncJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sync_jobs_project_id")
                            .from(SyncJobs::Table, SyncJobs::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Incremental window lookups: last completed job per (project, kind)
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_jobs_project_kind_status_completed")
                    .table(SyncJobs::Table)
                    .col(SyncJobs::ProjectId)
                    .col(SyncJobs::Kind)
                    .col(SyncJobs::Status)
                    .col(SyncJobs::CompletedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_jobs_project_kind_status_completed")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(SyncJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncJobs {
    Table,
    Id,
    ProjectId,
    Kind,
    Status,
    RequestedBy,
    Error,
    ItemsSynced,
    ItemsCreated,
    ItemsUpdated,
    Cursor,
    CreatedAt,
    StartedAt,
    CompletedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Projects {
    Table,
    Id,
}
