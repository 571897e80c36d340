//! Migration to create the risks table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Risks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Risks::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Risks::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(Risks::Title).text().not_null())
                    .col(ColumnDef::new(Risks::Description).text().null())
                    .col(
                        ColumnDef::new(Risks::Probability)
                            .text()
                            .not_null()
                            .default("medium"),
                    )
                    .col(
                        ColumnDef::new(Risks::Impact)
                            .text()
                            .not_null()
                            .default("medium"),
                    )
                    .col(
                        ColumnDef::new(Risks::Status)
                            .text()
                            .not_null()
                            .default("open"),
                    )
                    .col(ColumnDef::new(Risks::Category).text().null())
                    .col(ColumnDef::new(Risks::MitigationPlan).text().null())
                    .col(ColumnDef::new(Risks::Source).text().null())
                    .col(ColumnDef::new(Risks::ExternalId).text().null())
                    .col(ColumnDef::new(Risks::IdentifiedDate).date().null())
                    .col(
                        ColumnDef::new(Risks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Risks::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_risks_project_id")
                            .from(Risks::Table, Risks::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Lookups by reserved source tag and by title during reconciliation
        manager
            .create_index(
                Index::create()
                    .name("idx_risks_project_source")
                    .table(Risks::Table)
                    .col(Risks::ProjectId)
                    .col(Risks::Source)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_risks_project_title")
                    .table(Risks::Table)
                    .col(Risks::ProjectId)
                    .col(Risks::Title)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_risks_project_source").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_risks_project_title").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Risks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Risks {
    Table,
    Id,
    ProjectId,
    Title,
    Description,
    Probability,
    Impact,
    Status,
    Category,
    MitigationPlan,
    Source,
    ExternalId,
    IdentifiedDate,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Projects {
    Table,
    Id,
}
