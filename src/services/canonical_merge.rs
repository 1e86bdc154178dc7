//! Canonical identity and batch merging.
//!
//! Grouping is conservative: two items share a canonical work only when the
//! [`LinkPolicy`] derives the same identity key for both. The default policy
//! only trusts strong external ids, so ambiguous items stay apart.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{
    GlobalId, MediaType, MediaVariant, NormalizedMedia, NormalizedMediaMetadata, PipelineIdTag,
    RawMediaMetadata, SourceKey,
};
use crate::normalizer::MetadataNormalizer;

/// Decides which canonical identity a normalized item belongs to.
pub trait LinkPolicy: Send + Sync {
    /// Identity key, or `None` when the item must stay an unlinked singleton.
    fn identity_key(&self, metadata: &NormalizedMediaMetadata) -> Option<String>;

    /// Get the name of this policy for logging
    fn policy_name(&self) -> &'static str;
}

/// Links only on TMDB id (IMDb id as fallback). LIVE content never links.
pub struct StrongIdLinkPolicy;

impl StrongIdLinkPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StrongIdLinkPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkPolicy for StrongIdLinkPolicy {
    fn identity_key(&self, metadata: &NormalizedMediaMetadata) -> Option<String> {
        if metadata.media_type == MediaType::Live {
            return None;
        }

        let (namespace, id) = match metadata.tmdb_id.or(metadata.external_ids.tmdb_id) {
            Some(tmdb) => ("tmdb", tmdb.to_string()),
            None => {
                let imdb = metadata.external_ids.imdb_id.as_deref()?.trim();
                if imdb.is_empty() {
                    return None;
                }
                ("imdb", imdb.to_ascii_lowercase())
            }
        };

        match metadata.media_type {
            MediaType::Movie => Some(format!("movie:{}:{}", namespace, id)),
            // For episodes the external id names the series.
            MediaType::SeriesEpisode => match (metadata.season, metadata.episode) {
                (Some(season), Some(episode)) => Some(format!(
                    "episode:{}:{}:s{}e{}",
                    namespace, id, season, episode
                )),
                _ => None,
            },
            MediaType::Clip => Some(format!("clip:{}:{}", namespace, id)),
            MediaType::Unknown => Some(format!("unknown:{}:{}", namespace, id)),
            MediaType::Live => None,
        }
    }

    fn policy_name(&self) -> &'static str {
        "strong-id"
    }
}

/// Default variant for a linked item, filled from the title-derived quality hints.
pub fn variant_from_metadata(
    raw: &RawMediaMetadata,
    normalized: &NormalizedMediaMetadata,
    source_key: SourceKey,
) -> MediaVariant {
    let mut variant = MediaVariant::synthetic(source_key).with_label(raw.source_label.clone());
    if let Some(height) = normalized.quality_height {
        variant = variant.with_height(height);
    }
    if let Some(language) = &normalized.language_tag {
        variant = variant.with_language(language.clone());
    }
    variant
}

/// One output row of a batch merge.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMediaEntry {
    /// `None` for singletons (LIVE, ambiguous, malformed).
    pub canonical_id: Option<GlobalId>,
    pub primary_pipeline: PipelineIdTag,
    pub primary_source_id: String,
    pub media_type: MediaType,
    pub title: String,
    pub year: Option<u32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Every member source, in storage order. Empty only for malformed input.
    pub source_keys: Vec<SourceKey>,
}

impl NormalizedMediaEntry {
    pub fn is_linked(&self) -> bool {
        self.canonical_id.is_some()
    }

    fn singleton(raw: &RawMediaMetadata, normalized: &NormalizedMediaMetadata) -> Self {
        Self {
            canonical_id: None,
            primary_pipeline: raw.pipeline_id_tag,
            primary_source_id: raw.source_id.clone(),
            media_type: normalized.media_type,
            title: normalized.canonical_title.clone(),
            year: normalized.year,
            season: normalized.season,
            episode: normalized.episode,
            source_keys: raw.source_key().into_iter().collect(),
        }
    }

    fn from_media(media: &NormalizedMedia) -> Self {
        Self {
            canonical_id: Some(media.global_id().clone()),
            primary_pipeline: media.primary_pipeline_id_tag(),
            primary_source_id: media.primary_source_id().to_string(),
            media_type: media.media_type(),
            title: media.title().to_string(),
            year: media.year(),
            season: media.season(),
            episode: media.episode(),
            source_keys: media
                .variants()
                .iter()
                .map(|v| v.source_key.clone())
                .collect(),
        }
    }
}

enum Slot {
    Singleton(NormalizedMediaEntry),
    Group(NormalizedMedia),
}

/// Stateless batch merge over one list of raw items.
pub struct CanonicalMergeEngine {
    normalizer: Arc<dyn MetadataNormalizer>,
    policy: Arc<dyn LinkPolicy>,
}

impl CanonicalMergeEngine {
    pub fn new(normalizer: Arc<dyn MetadataNormalizer>, policy: Arc<dyn LinkPolicy>) -> Self {
        Self { normalizer, policy }
    }

    pub fn with_default_policy(normalizer: Arc<dyn MetadataNormalizer>) -> Self {
        Self::new(normalizer, Arc::new(StrongIdLinkPolicy::new()))
    }

    pub fn normalizer(&self) -> &dyn MetadataNormalizer {
        self.normalizer.as_ref()
    }

    pub fn policy(&self) -> &dyn LinkPolicy {
        self.policy.as_ref()
    }

    /// Identity key and canonical id for an already-normalized item.
    pub fn canonical_identity(
        &self,
        normalized: &NormalizedMediaMetadata,
    ) -> Option<(String, GlobalId)> {
        let key = self.policy.identity_key(normalized)?;
        let id = GlobalId::from_canonical_key(&key);
        Some((key, id))
    }

    /// Merge a batch. Output keeps the order in which each work first appeared;
    /// a bad item degrades to a singleton without affecting the others.
    pub fn normalize(&self, items: &[RawMediaMetadata]) -> Vec<NormalizedMediaEntry> {
        let mut slots: Vec<Slot> = Vec::with_capacity(items.len());
        let mut groups: HashMap<GlobalId, usize> = HashMap::new();

        for raw in items {
            let normalized = self.normalizer.normalize(raw);

            let source_key = match raw.source_key() {
                Ok(key) => key,
                Err(e) => {
                    warn!("Keeping malformed item '{}' unlinked: {}", raw.original_title, e);
                    slots.push(Slot::Singleton(NormalizedMediaEntry::singleton(
                        raw,
                        &normalized,
                    )));
                    continue;
                }
            };

            let Some((key, global_id)) = self.canonical_identity(&normalized) else {
                slots.push(Slot::Singleton(NormalizedMediaEntry::singleton(
                    raw,
                    &normalized,
                )));
                continue;
            };

            let variant = variant_from_metadata(raw, &normalized, source_key);
            match groups.get(&global_id) {
                Some(&index) => {
                    if let Slot::Group(media) = &mut slots[index] {
                        debug!("Merging {} into {} ({})", variant.source_key, global_id, key);
                        let merged = media.clone().with_variant(variant);
                        *media = fill_missing(merged, &normalized);
                    }
                }
                None => match NormalizedMedia::new(
                    global_id.clone(),
                    normalized.canonical_title.clone(),
                    normalized.media_type,
                    vec![variant],
                ) {
                    Ok(media) => {
                        groups.insert(global_id, slots.len());
                        slots.push(Slot::Group(fill_missing(media, &normalized)));
                    }
                    Err(e) => {
                        warn!("Could not open canonical work {}: {}", key, e);
                        slots.push(Slot::Singleton(NormalizedMediaEntry::singleton(
                            raw,
                            &normalized,
                        )));
                    }
                },
            }
        }

        slots
            .iter()
            .map(|slot| match slot {
                Slot::Singleton(entry) => entry.clone(),
                Slot::Group(media) => NormalizedMediaEntry::from_media(media),
            })
            .collect()
    }
}

/// Copy descriptive fields onto a work where it has none yet. Existing values win.
pub fn fill_missing(media: NormalizedMedia, normalized: &NormalizedMediaMetadata) -> NormalizedMedia {
    let year = media.year().or(normalized.year);
    let season = media.season().or(normalized.season);
    let episode = media.episode().or(normalized.episode);

    let mut external_ids = media.external_ids().clone();
    if external_ids.tmdb_id.is_none() {
        external_ids.tmdb_id = normalized.tmdb_id.or(normalized.external_ids.tmdb_id);
    }
    if external_ids.imdb_id.is_none() {
        external_ids.imdb_id = normalized.external_ids.imdb_id.clone();
    }

    let mut images = media.images().clone();
    let incoming = &normalized.images;
    images.poster = images.poster.or_else(|| incoming.poster.clone());
    images.backdrop = images.backdrop.or_else(|| incoming.backdrop.clone());
    images.thumbnail = images.thumbnail.or_else(|| incoming.thumbnail.clone());
    images.placeholder = images.placeholder.or_else(|| incoming.placeholder.clone());

    media
        .with_year(year)
        .with_episode_numbers(season, episode)
        .with_external_ids(external_ids)
        .with_images(images)
}
