//! Migration to create the action_items table.
//!
//! Action items mirror remote issues; (project_id, jira_key) is the natural
//! key the issue sync upserts on.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ActionItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ActionItems::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ActionItems::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(ActionItems::JiraKey).text().not_null())
                    .col(ColumnDef::new(ActionItems::Title).text().not_null())
                    .col(ColumnDef::new(ActionItems::Description).text().null())
                    .col(
                        ColumnDef::new(ActionItems::Status)
                            .text()
                            .not_null()
                            .default("no_status"),
                    )
                    .col(
                        ColumnDef::new(ActionItems::Priority)
                            .text()
                            .not_null()
                            .default("medium"),
                    )
                    .col(ColumnDef::new(ActionItems::IssueType).text().null())
                    .col(ColumnDef::new(ActionItems::Assignee).text().null())
                    .col(ColumnDef::new(ActionItems::DueDate).date().null())
                    .col(
                        ColumnDef::new(ActionItems::RemoteCreatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ActionItems::RemoteUpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ActionItems::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ActionItems::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_action_items_project_id")
                            .from(ActionItems::Table, ActionItems::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_action_items_project_jira_key")
                    .table(ActionItems::Table)
                    .col(ActionItems::ProjectId)
                    .col(ActionItems::JiraKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_action_items_project_jira_key")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ActionItems::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ActionItems {
    Table,
    Id,
    ProjectId,
    JiraKey,
    Title,
    Description,
    Status,
    Priority,
    IssueType,
    Assignee,
    DueDate,
    RemoteCreatedAt,
    RemoteUpdatedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Projects {
    Table,
    Id,
}
