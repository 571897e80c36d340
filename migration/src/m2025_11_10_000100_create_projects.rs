//! Migration to create the projects table.
//!
//! Only the columns the sync subsystem reads or caches live here; the rest of
//! the application extends this table through its own migrations.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Projects::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Projects::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Projects::Name).text().not_null())
                    .col(ColumnDef::new(Projects::JiraUrl).text().null())
                    .col(ColumnDef::new(Projects::JiraProjectKey).text().null())
                    .col(ColumnDef::new(Projects::JiraProjectName).text().null())
                    .col(ColumnDef::new(Projects::JiraBoardId).big_integer().null())
                    .col(ColumnDef::new(Projects::DeliveryUrl).text().null())
                    .col(ColumnDef::new(Projects::DeliveryId).text().null())
                    .col(ColumnDef::new(Projects::ClientName).text().null())
                    .col(ColumnDef::new(Projects::DeliveryStatus).text().null())
                    .col(ColumnDef::new(Projects::ProjectCategory).text().null())
                    .col(ColumnDef::new(Projects::HealthOverall).text().null())
                    .col(ColumnDef::new(Projects::HealthTime).text().null())
                    .col(ColumnDef::new(Projects::HealthCost).text().null())
                    .col(ColumnDef::new(Projects::HealthResources).text().null())
                    .col(ColumnDef::new(Projects::HealthSummary).text().null())
                    .col(ColumnDef::new(Projects::Currency).text().null())
                    .col(ColumnDef::new(Projects::TotalBudget).double().null())
                    .col(ColumnDef::new(Projects::SpentBudget).double().null())
                    .col(ColumnDef::new(Projects::RemainingBudget).double().null())
                    .col(ColumnDef::new(Projects::FteDayPrice).double().null())
                    .col(ColumnDef::new(Projects::TotalFteDays).double().null())
                    .col(ColumnDef::new(Projects::OverrunInvestment).double().null())
                    .col(ColumnDef::new(Projects::StartDate).date().null())
                    .col(ColumnDef::new(Projects::EndDate).date().null())
                    .col(ColumnDef::new(Projects::SprintGoal).text().null())
                    .col(
                        ColumnDef::new(Projects::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Projects::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Projects::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Projects {
    Table,
    Id,
    Name,
    JiraUrl,
    JiraProjectKey,
    JiraProjectName,
    JiraBoardId,
    DeliveryUrl,
    DeliveryId,
    ClientName,
    DeliveryStatus,
    ProjectCategory,
    HealthOverall,
    HealthTime,
    HealthCost,
    HealthResources,
    HealthSummary,
    Currency,
    TotalBudget,
    SpentBudget,
    RemainingBudget,
    FteDayPrice,
    TotalFteDays,
    OverrunInvestment,
    StartDate,
    EndDate,
    SprintGoal,
    LastSyncedAt,
    CreatedAt,
    UpdatedAt,
}
