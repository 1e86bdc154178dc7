use anyhow::{Context, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::batching::BatchSizing;
use super::canonical_merge::{CanonicalMergeEngine, fill_missing, variant_from_metadata};
use super::enrichment::EnrichmentService;
use crate::db::CatalogStore;
use crate::events::EventBus;
use crate::models::{
    GlobalId, MediaType, NormalizedMedia, NormalizedMediaMetadata, RawMediaMetadata, SourceKey,
    SourceRef, SourceType,
};
use crate::normalizer::MetadataNormalizer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked { global_id: GlobalId, created: bool },
    Singleton,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub works_updated: usize,
    pub works_deleted: usize,
    pub refs_deleted: u64,
}

/// Links raw items into persisted canonical works.
///
/// Every read-modify-write of one work happens under that work's mutex, so
/// two sources resolving to the same identity at once still produce a single
/// record. Locks are never nested.
pub struct CanonicalLinker {
    store: Arc<dyn CatalogStore>,
    engine: CanonicalMergeEngine,
    enrichment: Option<Arc<EnrichmentService>>,
    events: Option<Arc<EventBus>>,
    locks: DashMap<GlobalId, Arc<Mutex<()>>>,
}

impl CanonicalLinker {
    pub fn new(store: Arc<dyn CatalogStore>, engine: CanonicalMergeEngine) -> Self {
        Self {
            store,
            engine,
            enrichment: None,
            events: None,
            locks: DashMap::new(),
        }
    }

    pub fn with_enrichment(mut self, enrichment: Arc<EnrichmentService>) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    /// Normalization alone. Never reaches the metadata resolver.
    pub fn normalize_only(&self, raw: &RawMediaMetadata) -> NormalizedMediaMetadata {
        self.engine.normalizer().normalize(raw)
    }

    /// Normalize (and optionally enrich) one raw item the way `link` would.
    pub async fn prepare(&self, raw: &RawMediaMetadata) -> NormalizedMediaMetadata {
        let normalized = self.normalize_only(raw);
        match &self.enrichment {
            Some(enrichment) if normalized.media_type != MediaType::Live => {
                enrichment.enrich(normalized).await
            }
            _ => normalized,
        }
    }

    /// Prepare a whole chunk, resolving external metadata concurrently in
    /// enrichment-sized batches. Output order matches `items`.
    pub async fn prepare_batch(
        &self,
        items: &[RawMediaMetadata],
        sizing: &BatchSizing,
    ) -> Vec<NormalizedMediaMetadata> {
        let normalized: Vec<_> = items.iter().map(|raw| self.normalize_only(raw)).collect();
        match &self.enrichment {
            Some(enrichment) => enrichment.enrich_batch(normalized, sizing).await,
            None => normalized,
        }
    }

    /// Link one item and record the decision on its source reference.
    pub async fn link(&self, raw: &RawMediaMetadata) -> Result<LinkOutcome> {
        let normalized = self.prepare(raw).await;
        self.link_prepared(raw, normalized).await
    }

    /// [`Self::link`] for an item already run through [`Self::prepare`] or
    /// [`Self::prepare_batch`].
    pub async fn link_prepared(
        &self,
        raw: &RawMediaMetadata,
        normalized: NormalizedMediaMetadata,
    ) -> Result<LinkOutcome> {
        let source_key = raw.source_key()?;
        // Source refs are rewritten by every full scan; the variant rows are not.
        let previous_work = self.store.media_id_for_source(&source_key).await?;

        let Some((identity, global_id)) = self.engine.canonical_identity(&normalized) else {
            if let Some(old) = &previous_work {
                self.detach(old, &source_key).await?;
            }
            self.store
                .put_source_refs(&[SourceRef::singleton(raw.clone(), &normalized)?])
                .await?;
            debug!("{} kept as singleton", source_key);
            return Ok(LinkOutcome::Singleton);
        };

        if let Some(old) = previous_work.as_ref().filter(|old| **old != global_id) {
            info!(
                "{} moved from {} to {} ({})",
                source_key, old, global_id, identity
            );
            self.detach(old, &source_key).await?;
        }

        let created = {
            let lock = self.lock_for(&global_id);
            let _guard = lock.lock().await;

            let variant = variant_from_metadata(raw, &normalized, source_key.clone());
            let (media, created) = match self.store.load_media(&global_id).await? {
                Some(existing) => (existing.with_variant(variant), false),
                None => (
                    NormalizedMedia::new(
                        global_id.clone(),
                        normalized.canonical_title.clone(),
                        normalized.media_type,
                        vec![variant],
                    )?,
                    true,
                ),
            };
            let media = fill_missing(media, &normalized);
            self.store
                .put_media(&media)
                .await
                .with_context(|| format!("Failed to link {} into {}", source_key, global_id))?;
            created
        };
        self.release_lock(&global_id);

        self.store
            .put_source_refs(&[SourceRef::linked(
                raw.clone(),
                &normalized,
                global_id.clone(),
            )?])
            .await?;

        debug!(
            "{} linked into {} (created={}, policy={})",
            source_key,
            global_id,
            created,
            self.engine.policy().policy_name()
        );
        if let Some(events) = &self.events {
            events
                .emit_work(created, raw.source_type, global_id.clone(), source_key)
                .await;
        }

        Ok(LinkOutcome::Linked { global_id, created })
    }

    /// Flag one source's variant as (un)playable without touching the others.
    pub async fn set_variant_availability(&self, key: &SourceKey, available: bool) -> Result<bool> {
        let Some(global_id) = self.store.media_id_for_source(key).await? else {
            return Ok(false);
        };

        let lock = self.lock_for(&global_id);
        let updated = {
            let _guard = lock.lock().await;
            match self.store.load_media(&global_id).await? {
                Some(media) if media.variant(key).is_some() => {
                    self.store
                        .put_media(&media.with_availability(key, available))
                        .await?;
                    true
                }
                _ => false,
            }
        };
        drop(lock);
        self.release_lock(&global_id);
        Ok(updated)
    }

    /// Remove a whole source: its variants from every work, works left empty,
    /// and its source references.
    pub async fn prune_source(&self, source_type: SourceType) -> Result<PruneReport> {
        let pipeline = source_type.pipeline_id_tag();
        let mut report = PruneReport::default();

        for global_id in self.store.media_ids_for_pipeline(pipeline).await? {
            let lock = self.lock_for(&global_id);
            {
                let _guard = lock.lock().await;
                if let Some(media) = self.store.load_media(&global_id).await? {
                    match media.without_pipeline(pipeline) {
                        Some(remaining) => {
                            self.store.put_media(&remaining).await?;
                            report.works_updated += 1;
                        }
                        None => {
                            self.store.delete_media(&global_id).await?;
                            report.works_deleted += 1;
                        }
                    }
                }
            }
            drop(lock);
            self.release_lock(&global_id);
        }

        report.refs_deleted = self.store.delete_source_refs(source_type).await?;
        info!(
            "Pruned {}: {} works updated, {} deleted, {} references removed",
            source_type, report.works_updated, report.works_deleted, report.refs_deleted
        );
        if let Some(events) = &self.events {
            events
                .emit_pruned(
                    source_type,
                    report.works_updated,
                    report.works_deleted,
                    report.refs_deleted,
                )
                .await;
        }
        Ok(report)
    }

    async fn detach(&self, global_id: &GlobalId, key: &SourceKey) -> Result<()> {
        let lock = self.lock_for(global_id);
        {
            let _guard = lock.lock().await;
            match self.store.load_media(global_id).await? {
                Some(media) => match media.without_source(key) {
                    Some(remaining) => self.store.put_media(&remaining).await?,
                    None => {
                        debug!("{} lost its last variant, deleting", global_id);
                        self.store.delete_media(global_id).await?
                    }
                },
                None => warn!("{} pointed at missing work {}", key, global_id),
            }
        }
        drop(lock);
        self.release_lock(global_id);
        Ok(())
    }

    fn lock_for(&self, global_id: &GlobalId) -> Arc<Mutex<()>> {
        self.locks
            .entry(global_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the map entry once nobody else holds or waits on it.
    fn release_lock(&self, global_id: &GlobalId) {
        self.locks
            .remove_if(global_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.len()
    }
}
