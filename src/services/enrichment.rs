use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use super::batching::BatchSizing;
use crate::models::{MediaType, NormalizedMediaMetadata};

/// Identity data an external metadata service (TMDB and similar) returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMetadata {
    pub tmdb_id: Option<u64>,
    pub imdb_id: Option<String>,
    pub year: Option<u32>,
}

#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// `Ok(None)` means the service knows nothing about this item.
    async fn resolve(&self, metadata: &NormalizedMediaMetadata) -> Result<Option<ResolvedMetadata>>;

    fn resolver_name(&self) -> &'static str;
}

/// Fills identity gaps from a [`MetadataResolver`]. Never fatal: a failed or
/// empty lookup returns the input unchanged.
pub struct EnrichmentService {
    resolver: Arc<dyn MetadataResolver>,
}

impl EnrichmentService {
    pub fn new(resolver: Arc<dyn MetadataResolver>) -> Self {
        Self { resolver }
    }

    fn needs_lookup(metadata: &NormalizedMediaMetadata) -> bool {
        metadata.media_type != MediaType::Live
            && (metadata.tmdb_id.is_none()
                || metadata.external_ids.imdb_id.is_none()
                || metadata.year.is_none())
    }

    pub async fn enrich(&self, metadata: NormalizedMediaMetadata) -> NormalizedMediaMetadata {
        if !Self::needs_lookup(&metadata) {
            return metadata;
        }

        match self.resolver.resolve(&metadata).await {
            Ok(Some(resolved)) => {
                debug!(
                    "{} resolved '{}' to tmdb={:?}",
                    self.resolver.resolver_name(),
                    metadata.canonical_title,
                    resolved.tmdb_id
                );
                apply(metadata, resolved)
            }
            Ok(None) => {
                debug!(
                    "{} has no match for '{}'",
                    self.resolver.resolver_name(),
                    metadata.canonical_title
                );
                metadata
            }
            Err(e) => {
                warn!(
                    "{} lookup failed for '{}', keeping normalized data: {:#}",
                    self.resolver.resolver_name(),
                    metadata.canonical_title,
                    e
                );
                metadata
            }
        }
    }

    /// Enrich many items, at most one enrichment batch in flight at a time.
    pub async fn enrich_batch(
        &self,
        items: Vec<NormalizedMediaMetadata>,
        sizing: &BatchSizing,
    ) -> Vec<NormalizedMediaMetadata> {
        let batch_size = sizing.tmdb_enrichment_batch_size().max(1);
        let mut enriched = Vec::with_capacity(items.len());
        let mut pending = items.into_iter().peekable();

        while pending.peek().is_some() {
            let batch: Vec<_> = pending.by_ref().take(batch_size).collect();
            enriched.extend(join_all(batch.into_iter().map(|m| self.enrich(m))).await);
        }
        enriched
    }
}

fn apply(mut metadata: NormalizedMediaMetadata, resolved: ResolvedMetadata) -> NormalizedMediaMetadata {
    if metadata.tmdb_id.is_none() {
        metadata.tmdb_id = resolved.tmdb_id;
    }
    if metadata.external_ids.tmdb_id.is_none() {
        metadata.external_ids.tmdb_id = metadata.tmdb_id;
    }
    if metadata.external_ids.imdb_id.is_none() {
        metadata.external_ids.imdb_id = resolved.imdb_id;
    }
    if metadata.year.is_none() {
        metadata.year = resolved.year;
    }
    metadata
}
