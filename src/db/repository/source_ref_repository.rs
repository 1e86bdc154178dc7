use super::{BaseRepository, Repository};
use crate::db::entities::{SourceRefActiveModel, SourceRefEntity, SourceRefModel, source_refs};
use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;

/// Repository for persisted per-source references
#[async_trait]
pub trait SourceRefRepository: Repository<SourceRefModel> {
    /// Insert or replace a batch of references as one unit of work
    async fn upsert_batch(&self, refs: Vec<SourceRefActiveModel>) -> Result<usize>;

    /// Keyset page of references in one link state, ordered by source key
    async fn find_by_state_after(
        &self,
        source_type: &str,
        link_state: &str,
        after_key: Option<&str>,
        limit: u64,
    ) -> Result<Vec<SourceRefModel>>;

    /// Set the link state and canonical id of one reference
    async fn update_link_state(
        &self,
        source_key: &str,
        link_state: &str,
        canonical_id: Option<String>,
    ) -> Result<()>;

    /// Count references of a source type, optionally restricted to one link state
    async fn count_by_type(&self, source_type: &str, link_state: Option<&str>) -> Result<u64>;

    /// Delete every reference of a source type
    async fn delete_by_type(&self, source_type: &str) -> Result<u64>;
}

#[derive(Debug)]
pub struct SourceRefRepositoryImpl {
    base: BaseRepository,
}

impl SourceRefRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl Repository<SourceRefModel> for SourceRefRepositoryImpl {
    type Entity = SourceRefEntity;

    async fn find_by_id(&self, id: &str) -> Result<Option<SourceRefModel>> {
        Ok(SourceRefEntity::find_by_id(id.to_string())
            .one(self.base.db.as_ref())
            .await?)
    }

    async fn find_all(&self) -> Result<Vec<SourceRefModel>> {
        Ok(SourceRefEntity::find()
            .order_by_asc(source_refs::Column::SourceKey)
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn insert(&self, entity: SourceRefModel) -> Result<SourceRefModel> {
        let active_model = entity.into_active_model().reset_all();
        Ok(active_model.insert(self.base.db.as_ref()).await?)
    }

    async fn update(&self, entity: SourceRefModel) -> Result<SourceRefModel> {
        let mut active_model = entity.into_active_model().reset_all();
        active_model.updated_at = Set(chrono::Utc::now().naive_utc());
        Ok(active_model.update(self.base.db.as_ref()).await?)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        SourceRefEntity::delete_by_id(id.to_string())
            .exec(self.base.db.as_ref())
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(SourceRefEntity::find().count(self.base.db.as_ref()).await?)
    }
}

#[async_trait]
impl SourceRefRepository for SourceRefRepositoryImpl {
    async fn upsert_batch(&self, refs: Vec<SourceRefActiveModel>) -> Result<usize> {
        let txn = self.base.db.begin().await?;
        let mut written = 0;

        for active_model in refs {
            let key = match &active_model.source_key {
                sea_orm::ActiveValue::Set(key) | sea_orm::ActiveValue::Unchanged(key) => {
                    key.clone()
                }
                sea_orm::ActiveValue::NotSet => continue,
            };

            let exists = SourceRefEntity::find_by_id(key).one(&txn).await?.is_some();
            if exists {
                active_model.update(&txn).await?;
            } else {
                active_model.insert(&txn).await?;
            }
            written += 1;
        }

        txn.commit().await?;
        Ok(written)
    }

    async fn find_by_state_after(
        &self,
        source_type: &str,
        link_state: &str,
        after_key: Option<&str>,
        limit: u64,
    ) -> Result<Vec<SourceRefModel>> {
        let mut query = SourceRefEntity::find()
            .filter(source_refs::Column::SourceType.eq(source_type))
            .filter(source_refs::Column::LinkState.eq(link_state));
        if let Some(after) = after_key {
            query = query.filter(source_refs::Column::SourceKey.gt(after));
        }

        Ok(query
            .order_by_asc(source_refs::Column::SourceKey)
            .limit(limit)
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn update_link_state(
        &self,
        source_key: &str,
        link_state: &str,
        canonical_id: Option<String>,
    ) -> Result<()> {
        if let Some(existing) = self.find_by_id(source_key).await? {
            let mut active_model: SourceRefActiveModel = existing.into();
            active_model.link_state = Set(link_state.to_string());
            active_model.canonical_id = Set(canonical_id);
            active_model.updated_at = Set(chrono::Utc::now().naive_utc());
            active_model.update(self.base.db.as_ref()).await?;
        }
        Ok(())
    }

    async fn count_by_type(&self, source_type: &str, link_state: Option<&str>) -> Result<u64> {
        let mut query =
            SourceRefEntity::find().filter(source_refs::Column::SourceType.eq(source_type));
        if let Some(state) = link_state {
            query = query.filter(source_refs::Column::LinkState.eq(state));
        }
        Ok(query.count(self.base.db.as_ref()).await?)
    }

    async fn delete_by_type(&self, source_type: &str) -> Result<u64> {
        let result = SourceRefEntity::delete_many()
            .filter(source_refs::Column::SourceType.eq(source_type))
            .exec(self.base.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}
