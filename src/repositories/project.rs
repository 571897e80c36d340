//! Project repository
//!
//! The sync core only reads identifying fields and writes cached ones, so
//! this stays small: lookups, the linked-project scan and a partial update.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    QueryOrder,
};
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::project::{ActiveModel, Column, Entity, Model};

pub struct ProjectRepository<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> ProjectRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id).one(self.conn).await
    }

    /// Like [`find`](Self::find) but a missing row is [`SyncError::ProjectNotFound`].
    pub async fn require(&self, id: Uuid) -> Result<Model, SyncError> {
        self.find(id).await?.ok_or(SyncError::ProjectNotFound(id))
    }

    /// Projects linked to at least one remote system, oldest sync first.
    pub async fn list_linked(&self) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(
                Condition::any()
                    .add(Column::JiraProjectKey.is_not_null())
                    .add(Column::JiraUrl.is_not_null())
                    .add(Column::DeliveryId.is_not_null())
                    .add(Column::DeliveryUrl.is_not_null()),
            )
            .order_by_asc(Column::LastSyncedAt)
            .all(self.conn)
            .await
    }

    /// Writes only the columns set on `changes`.
    pub async fn update(&self, changes: ActiveModel) -> Result<Model, DbErr> {
        changes.update(self.conn).await
    }
}
