//! Engine-facing persistence boundary.
//!
//! The merge engine, scheduler and backlog worker only see [`CatalogStore`]:
//! put-one / put-chunk, point lookups by canonical id and source key, offset
//! paging and counts, plus the per-source sync ledger.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::connection::DatabaseConnection;
use super::entities::SyncLedgerActiveModel;
use super::repository::{
    CanonicalMediaRepository, CanonicalMediaRepositoryImpl, Repository, SourceRefRepository,
    SourceRefRepositoryImpl, SyncLedgerRepository, SyncLedgerRepositoryImpl,
};
use crate::mapper::{
    canonical_media_from_models, canonical_media_to_active_model, source_ref_to_active_model,
    variant_to_active_model,
};
use crate::models::{
    GlobalId, LinkState, NormalizedMedia, PipelineIdTag, SourceKey, SourceRef, SourceType,
    SyncLedgerEntry,
};
use crate::utils::errors::CatalogResult;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Persist one chunk of source references as a single unit of work.
    async fn put_source_refs(&self, refs: &[SourceRef]) -> Result<usize>;

    async fn find_source_ref(&self, key: &SourceKey) -> Result<Option<SourceRef>>;

    /// Keyset page of references in `state`, strictly after `after` in key order.
    async fn source_refs_in_state(
        &self,
        source_type: SourceType,
        state: LinkState,
        after: Option<&SourceKey>,
        limit: u64,
    ) -> Result<Vec<SourceRef>>;

    async fn set_link_state(
        &self,
        key: &SourceKey,
        state: LinkState,
        canonical_id: Option<&GlobalId>,
    ) -> Result<()>;

    async fn count_source_refs(
        &self,
        source_type: SourceType,
        state: Option<LinkState>,
    ) -> Result<u64>;

    async fn delete_source_refs(&self, source_type: SourceType) -> Result<u64>;

    async fn load_media(&self, id: &GlobalId) -> Result<Option<NormalizedMedia>>;

    /// Write the work row and its complete ordered variant list.
    async fn put_media(&self, media: &NormalizedMedia) -> Result<()>;

    async fn delete_media(&self, id: &GlobalId) -> Result<()>;

    async fn page_media(&self, offset: u64, limit: u64) -> Result<Vec<NormalizedMedia>>;

    async fn count_media(&self) -> Result<u64>;

    /// Works holding at least one variant from `pipeline`.
    async fn media_ids_for_pipeline(&self, pipeline: PipelineIdTag) -> Result<Vec<GlobalId>>;

    /// The work currently holding the variant for `key`, read from the
    /// variant rows rather than the source reference.
    async fn media_id_for_source(&self, key: &SourceKey) -> Result<Option<GlobalId>>;

    async fn load_ledger(&self, source_type: SourceType) -> Result<Option<SyncLedgerEntry>>;

    /// Write scan progress. Backlog fields are only taken from `entry` when
    /// the row is new; afterwards they change through [`Self::set_backlog_state`].
    async fn save_ledger(&self, entry: &SyncLedgerEntry) -> Result<()>;

    async fn set_backlog_state(
        &self,
        source_type: SourceType,
        pending: bool,
        estimate: u64,
    ) -> Result<()>;

    async fn pending_backlogs(&self) -> Result<Vec<SyncLedgerEntry>>;
}

/// SQLite-backed store. Write transactions are serialized in-process:
/// SQLite allows one writer, and a deferred read-then-write transaction that
/// loses the race fails instead of waiting.
pub struct SqliteCatalogStore {
    media: CanonicalMediaRepositoryImpl,
    source_refs: SourceRefRepositoryImpl,
    ledger: SyncLedgerRepositoryImpl,
    write_lock: Mutex<()>,
}

impl SqliteCatalogStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            media: CanonicalMediaRepositoryImpl::new(db.clone()),
            source_refs: SourceRefRepositoryImpl::new(db.clone()),
            ledger: SyncLedgerRepositoryImpl::new(db),
            write_lock: Mutex::new(()),
        }
    }

    pub fn shared(db: DatabaseConnection) -> Arc<dyn CatalogStore> {
        Arc::new(Self::new(db))
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn put_source_refs(&self, refs: &[SourceRef]) -> Result<usize> {
        let models = refs
            .iter()
            .map(source_ref_to_active_model)
            .collect::<CatalogResult<Vec<_>>>()?;
        let _write = self.write_lock.lock().await;
        let written = self
            .source_refs
            .upsert_batch(models)
            .await
            .context("Failed to write source reference chunk")?;
        debug!("Committed {} source references", written);
        Ok(written)
    }

    async fn find_source_ref(&self, key: &SourceKey) -> Result<Option<SourceRef>> {
        match self
            .source_refs
            .find_by_id(&key.to_serialized_string())
            .await?
        {
            Some(model) => Ok(Some(SourceRef::try_from(model)?)),
            None => Ok(None),
        }
    }

    async fn source_refs_in_state(
        &self,
        source_type: SourceType,
        state: LinkState,
        after: Option<&SourceKey>,
        limit: u64,
    ) -> Result<Vec<SourceRef>> {
        let after = after.map(SourceKey::to_serialized_string);
        let models = self
            .source_refs
            .find_by_state_after(source_type.as_str(), state.as_str(), after.as_deref(), limit)
            .await?;
        Ok(models
            .into_iter()
            .map(SourceRef::try_from)
            .collect::<CatalogResult<Vec<_>>>()?)
    }

    async fn set_link_state(
        &self,
        key: &SourceKey,
        state: LinkState,
        canonical_id: Option<&GlobalId>,
    ) -> Result<()> {
        let _write = self.write_lock.lock().await;
        self.source_refs
            .update_link_state(
                &key.to_serialized_string(),
                state.as_str(),
                canonical_id.map(GlobalId::to_string),
            )
            .await
    }

    async fn count_source_refs(
        &self,
        source_type: SourceType,
        state: Option<LinkState>,
    ) -> Result<u64> {
        self.source_refs
            .count_by_type(source_type.as_str(), state.as_ref().map(LinkState::as_str))
            .await
    }

    async fn delete_source_refs(&self, source_type: SourceType) -> Result<u64> {
        let _write = self.write_lock.lock().await;
        self.source_refs.delete_by_type(source_type.as_str()).await
    }

    async fn load_media(&self, id: &GlobalId) -> Result<Option<NormalizedMedia>> {
        let Some(work) = self.media.find_by_id(id.as_str()).await? else {
            return Ok(None);
        };
        let variants = self.media.find_variants(id.as_str()).await?;
        if variants.is_empty() {
            // A work row without variants is never written; treat it as absent.
            return Ok(None);
        }
        Ok(Some(canonical_media_from_models(work, variants)?))
    }

    async fn put_media(&self, media: &NormalizedMedia) -> Result<()> {
        let work = canonical_media_to_active_model(media)?;
        let variants = media
            .variants()
            .iter()
            .enumerate()
            .map(|(position, variant)| variant_to_active_model(media.global_id(), position, variant))
            .collect::<CatalogResult<Vec<_>>>()?;

        let _write = self.write_lock.lock().await;
        self.media
            .save_with_variants(media.global_id().as_str(), work, variants)
            .await
            .with_context(|| format!("Failed to save canonical work {}", media.global_id()))
    }

    async fn delete_media(&self, id: &GlobalId) -> Result<()> {
        let _write = self.write_lock.lock().await;
        self.media.delete_with_variants(id.as_str()).await
    }

    async fn page_media(&self, offset: u64, limit: u64) -> Result<Vec<NormalizedMedia>> {
        let works = self.media.find_page(offset, limit).await?;
        let ids: Vec<String> = works.iter().map(|w| w.global_id.clone()).collect();

        let mut by_work: HashMap<String, Vec<_>> = HashMap::new();
        for variant in self.media.find_variants_for(&ids).await? {
            by_work
                .entry(variant.global_id.clone())
                .or_default()
                .push(variant);
        }

        let mut page = Vec::with_capacity(works.len());
        for work in works {
            let variants = by_work.remove(&work.global_id).unwrap_or_default();
            if variants.is_empty() {
                continue;
            }
            page.push(canonical_media_from_models(work, variants)?);
        }
        Ok(page)
    }

    async fn count_media(&self) -> Result<u64> {
        self.media.count().await
    }

    async fn media_ids_for_pipeline(&self, pipeline: PipelineIdTag) -> Result<Vec<GlobalId>> {
        let prefix = format!("{}:", pipeline.code());
        let ids = self.media.find_ids_with_variant_prefix(&prefix).await?;
        Ok(ids
            .iter()
            .map(|id| GlobalId::parse(id))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn media_id_for_source(&self, key: &SourceKey) -> Result<Option<GlobalId>> {
        let owner = self
            .media
            .find_owner_of_variant(&key.to_serialized_string())
            .await?;
        Ok(owner.as_deref().map(GlobalId::parse).transpose()?)
    }

    async fn load_ledger(&self, source_type: SourceType) -> Result<Option<SyncLedgerEntry>> {
        match self.ledger.find_by_id(source_type.as_str()).await? {
            Some(model) => Ok(Some(SyncLedgerEntry::try_from(model)?)),
            None => Ok(None),
        }
    }

    async fn save_ledger(&self, entry: &SyncLedgerEntry) -> Result<()> {
        let _write = self.write_lock.lock().await;
        let mut model = SyncLedgerActiveModel::from(entry);
        if self
            .ledger
            .find_by_id(entry.source_type.as_str())
            .await?
            .is_some()
        {
            model.backlog_pending = NotSet;
            model.backlog_estimate = NotSet;
        }
        self.ledger
            .upsert(model)
            .await
            .with_context(|| format!("Failed to save sync ledger for {}", entry.source_type))
    }

    async fn set_backlog_state(
        &self,
        source_type: SourceType,
        pending: bool,
        estimate: u64,
    ) -> Result<()> {
        let _write = self.write_lock.lock().await;
        let now = Utc::now();
        let touched = self
            .ledger
            .update_backlog(
                source_type.as_str(),
                pending,
                i64::try_from(estimate).unwrap_or(i64::MAX),
                now.naive_utc(),
            )
            .await?;
        if touched == 0 {
            let mut entry = SyncLedgerEntry::new(source_type);
            entry.backlog_pending = pending;
            entry.backlog_estimate = estimate;
            self.ledger
                .upsert(SyncLedgerActiveModel::from(&entry))
                .await?;
        }
        debug!(
            "Backlog for {}: pending={} estimate={}",
            source_type, pending, estimate
        );
        Ok(())
    }

    async fn pending_backlogs(&self) -> Result<Vec<SyncLedgerEntry>> {
        Ok(self
            .ledger
            .find_backlog_pending()
            .await?
            .into_iter()
            .map(SyncLedgerEntry::try_from)
            .collect::<CatalogResult<Vec<_>>>()?)
    }
}
