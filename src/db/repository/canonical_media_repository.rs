use super::{BaseRepository, Repository};
use crate::db::entities::{
    CanonicalMedia, CanonicalMediaActiveModel, CanonicalMediaModel, MediaVariantActiveModel,
    MediaVariantEntity, MediaVariantModel, canonical_media, media_variants,
};
use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, NotSet,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Repository for canonical works and their ordered variants
#[async_trait]
pub trait CanonicalMediaRepository: Repository<CanonicalMediaModel> {
    /// Variants of one work in stored order
    async fn find_variants(&self, global_id: &str) -> Result<Vec<MediaVariantModel>>;

    /// Variants of many works at once, in stored order per work
    async fn find_variants_for(&self, global_ids: &[String]) -> Result<Vec<MediaVariantModel>>;

    /// Write a work and replace its whole variant list in one transaction
    async fn save_with_variants(
        &self,
        global_id: &str,
        work: CanonicalMediaActiveModel,
        variants: Vec<MediaVariantActiveModel>,
    ) -> Result<()>;

    /// Delete a work together with its variants
    async fn delete_with_variants(&self, global_id: &str) -> Result<()>;

    /// Stable page of works, oldest first
    async fn find_page(&self, offset: u64, limit: u64) -> Result<Vec<CanonicalMediaModel>>;

    /// Ids of works holding at least one variant whose source key starts with `prefix`
    async fn find_ids_with_variant_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Id of the work whose variant list holds `source_key`
    async fn find_owner_of_variant(&self, source_key: &str) -> Result<Option<String>>;
}

#[derive(Debug)]
pub struct CanonicalMediaRepositoryImpl {
    base: BaseRepository,
}

impl CanonicalMediaRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl Repository<CanonicalMediaModel> for CanonicalMediaRepositoryImpl {
    type Entity = CanonicalMedia;

    async fn find_by_id(&self, id: &str) -> Result<Option<CanonicalMediaModel>> {
        Ok(CanonicalMedia::find_by_id(id.to_string())
            .one(self.base.db.as_ref())
            .await?)
    }

    async fn find_all(&self) -> Result<Vec<CanonicalMediaModel>> {
        Ok(CanonicalMedia::find()
            .order_by_asc(canonical_media::Column::CreatedAt)
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn insert(&self, entity: CanonicalMediaModel) -> Result<CanonicalMediaModel> {
        let active_model = entity.into_active_model().reset_all();
        Ok(active_model.insert(self.base.db.as_ref()).await?)
    }

    async fn update(&self, entity: CanonicalMediaModel) -> Result<CanonicalMediaModel> {
        let mut active_model = entity.into_active_model().reset_all();
        active_model.created_at = NotSet;
        Ok(active_model.update(self.base.db.as_ref()).await?)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.delete_with_variants(id).await
    }

    async fn count(&self) -> Result<u64> {
        Ok(CanonicalMedia::find().count(self.base.db.as_ref()).await?)
    }
}

#[async_trait]
impl CanonicalMediaRepository for CanonicalMediaRepositoryImpl {
    async fn find_variants(&self, global_id: &str) -> Result<Vec<MediaVariantModel>> {
        Ok(MediaVariantEntity::find()
            .filter(media_variants::Column::GlobalId.eq(global_id))
            .order_by_asc(media_variants::Column::Position)
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn find_variants_for(&self, global_ids: &[String]) -> Result<Vec<MediaVariantModel>> {
        if global_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(MediaVariantEntity::find()
            .filter(media_variants::Column::GlobalId.is_in(global_ids.iter().cloned()))
            .order_by_asc(media_variants::Column::GlobalId)
            .order_by_asc(media_variants::Column::Position)
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn save_with_variants(
        &self,
        global_id: &str,
        work: CanonicalMediaActiveModel,
        variants: Vec<MediaVariantActiveModel>,
    ) -> Result<()> {
        let txn = self.base.db.begin().await?;

        let exists = CanonicalMedia::find_by_id(global_id.to_string())
            .one(&txn)
            .await?
            .is_some();
        if exists {
            let mut work = work;
            work.created_at = NotSet;
            work.update(&txn).await?;
        } else {
            work.insert(&txn).await?;
        }

        // Variant order is positional, so the list is rewritten as a whole
        MediaVariantEntity::delete_many()
            .filter(media_variants::Column::GlobalId.eq(global_id))
            .exec(&txn)
            .await?;
        for variant in variants {
            variant.insert(&txn).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn delete_with_variants(&self, global_id: &str) -> Result<()> {
        let txn = self.base.db.begin().await?;
        MediaVariantEntity::delete_many()
            .filter(media_variants::Column::GlobalId.eq(global_id))
            .exec(&txn)
            .await?;
        CanonicalMedia::delete_by_id(global_id.to_string())
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn find_page(&self, offset: u64, limit: u64) -> Result<Vec<CanonicalMediaModel>> {
        Ok(CanonicalMedia::find()
            .order_by_asc(canonical_media::Column::CreatedAt)
            .order_by_asc(canonical_media::Column::GlobalId)
            .offset(offset)
            .limit(limit)
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn find_ids_with_variant_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let rows = MediaVariantEntity::find()
            .filter(media_variants::Column::SourceKey.starts_with(prefix))
            .all(self.base.db.as_ref())
            .await?;
        let ids: BTreeSet<String> = rows.into_iter().map(|v| v.global_id).collect();
        Ok(ids.into_iter().collect())
    }

    async fn find_owner_of_variant(&self, source_key: &str) -> Result<Option<String>> {
        Ok(MediaVariantEntity::find()
            .filter(media_variants::Column::SourceKey.eq(source_key))
            .one(self.base.db.as_ref())
            .await?
            .map(|v| v.global_id))
    }
}
