use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{ExternalIds, GlobalId, MediaImages, MediaType, PipelineIdTag, SourceKey};
use crate::utils::errors::ModelError;

/// Playback hint carrying a URL the player can open without a resolver round trip.
pub const HINT_DIRECT_URL: &str = "direct_url";

/// Coarse quality bucket. Declaration order is ranking order (lowest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Unspecified quality ("source" rendition).
    Source,
    Sd,
    Hd,
    FullHd,
    Uhd4k,
}

impl QualityTier {
    pub fn from_height(height: Option<u32>) -> Self {
        match height {
            None | Some(0) => QualityTier::Source,
            Some(h) if h >= 2160 => QualityTier::Uhd4k,
            Some(h) if h >= 1080 => QualityTier::FullHd,
            Some(h) if h >= 720 => QualityTier::Hd,
            Some(_) => QualityTier::Sd,
        }
    }
}

/// Ranking tuple for a variant; field order is comparison order, greater is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VariantRank {
    pub source_priority: u8,
    pub quality: QualityTier,
    pub direct_url: bool,
    pub explicit: bool,
}

/// One playable rendition of a canonical work, tied to exactly one source key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaVariant {
    pub source_key: SourceKey,
    pub source_label: String,
    pub height: Option<u32>,
    pub video_codec: Option<String>,
    pub container: Option<String>,
    pub language_tag: Option<String>,
    pub size_bytes: Option<u64>,
    pub available: bool,
    /// Default variant synthesized from item metadata rather than declared by the source.
    pub synthetic: bool,
    /// Source-specific values needed only to build a playback URL.
    #[serde(default)]
    pub playback_hints: BTreeMap<String, String>,
}

impl MediaVariant {
    pub fn new(source_key: SourceKey) -> Self {
        let source_label = source_key.pipeline().source_type().as_str().to_string();
        Self {
            source_key,
            source_label,
            height: None,
            video_codec: None,
            container: None,
            language_tag: None,
            size_bytes: None,
            available: true,
            synthetic: false,
            playback_hints: BTreeMap::new(),
        }
    }

    pub fn synthetic(source_key: SourceKey) -> Self {
        Self {
            synthetic: true,
            ..Self::new(source_key)
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.source_label = label.into();
        self
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_language(mut self, language_tag: impl Into<String>) -> Self {
        self.language_tag = Some(language_tag.into());
        self
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = Some(codec.into());
        self
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.playback_hints.insert(key.into(), value.into());
        self
    }

    pub fn with_availability(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    pub fn quality_tier(&self) -> QualityTier {
        QualityTier::from_height(self.height)
    }

    /// local > plex > xtream > telegram > everything else
    pub fn source_priority(&self) -> u8 {
        match self.source_key.pipeline() {
            PipelineIdTag::Io => 5,
            PipelineIdTag::Plex => 4,
            PipelineIdTag::Xtream => 3,
            PipelineIdTag::Telegram => 2,
            PipelineIdTag::Audiobook | PipelineIdTag::Other => 1,
        }
    }

    pub fn has_direct_url(&self) -> bool {
        self.playback_hints
            .get(HINT_DIRECT_URL)
            .is_some_and(|url| !url.trim().is_empty())
    }

    pub fn rank(&self) -> VariantRank {
        VariantRank {
            source_priority: self.source_priority(),
            quality: self.quality_tier(),
            direct_url: self.has_direct_url(),
            explicit: !self.synthetic,
        }
    }

    /// Case-insensitive match on the primary language subtag (`de` matches `de-DE`).
    pub fn matches_language(&self, preferred: &str) -> bool {
        fn primary(tag: &str) -> String {
            tag.split(['-', '_'])
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        }

        let wanted = primary(preferred);
        !wanted.is_empty()
            && self
                .language_tag
                .as_deref()
                .is_some_and(|tag| primary(tag) == wanted)
    }
}

/// Stable storage order: available first, then best rank; ties keep insertion order.
pub(crate) fn sort_variants(variants: &mut [MediaVariant]) {
    variants.sort_by_key(|v| (Reverse(v.available), Reverse(v.rank())));
}

/// The canonical logical work aggregating one or more variants.
///
/// Fields are private so the two invariants hold at every observable point:
/// the variant list is never empty, and the denormalized primary pointer
/// always names the first available variant (or the first variant when none
/// is available). Every mutator consumes `self` and returns the updated value.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMedia {
    global_id: GlobalId,
    title: String,
    year: Option<u32>,
    media_type: MediaType,
    season: Option<u32>,
    episode: Option<u32>,
    external_ids: ExternalIds,
    images: MediaImages,
    primary_source_key: SourceKey,
    variants: Vec<MediaVariant>,
}

impl NormalizedMedia {
    pub fn new(
        global_id: GlobalId,
        title: impl Into<String>,
        media_type: MediaType,
        variants: Vec<MediaVariant>,
    ) -> Result<Self, ModelError> {
        let mut unique: Vec<MediaVariant> = Vec::with_capacity(variants.len());
        for variant in variants {
            if !unique.iter().any(|v| v.source_key == variant.source_key) {
                unique.push(variant);
            }
        }

        let first_key = unique
            .first()
            .map(|v| v.source_key.clone())
            .ok_or(ModelError::EmptyVariants)?;

        let mut media = Self {
            global_id,
            title: title.into(),
            year: None,
            media_type,
            season: None,
            episode: None,
            external_ids: ExternalIds::default(),
            images: MediaImages::default(),
            primary_source_key: first_key,
            variants: unique,
        };
        media.reorder();
        Ok(media)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_year(mut self, year: Option<u32>) -> Self {
        self.year = year;
        self
    }

    pub fn with_episode_numbers(mut self, season: Option<u32>, episode: Option<u32>) -> Self {
        self.season = season;
        self.episode = episode;
        self
    }

    pub fn with_external_ids(mut self, external_ids: ExternalIds) -> Self {
        self.external_ids = external_ids;
        self
    }

    pub fn with_images(mut self, images: MediaImages) -> Self {
        self.images = images;
        self
    }

    /// Insert a variant, or replace the one with the same source key.
    pub fn with_variant(mut self, variant: MediaVariant) -> Self {
        match self
            .variants
            .iter_mut()
            .find(|v| v.source_key == variant.source_key)
        {
            Some(existing) => *existing = variant,
            None => self.variants.push(variant),
        }
        self.reorder();
        self
    }

    /// Remove one source's variant. Returns `None` when it was the last one,
    /// meaning the whole record must be deleted.
    pub fn without_source(mut self, source_key: &SourceKey) -> Option<Self> {
        self.variants.retain(|v| &v.source_key != source_key);
        self.restore_after_removal()
    }

    /// Remove every variant from one pipeline (source removed entirely).
    pub fn without_pipeline(mut self, pipeline: PipelineIdTag) -> Option<Self> {
        self.variants.retain(|v| v.source_key.pipeline() != pipeline);
        self.restore_after_removal()
    }

    pub fn with_availability(mut self, source_key: &SourceKey, available: bool) -> Self {
        if let Some(variant) = self
            .variants
            .iter_mut()
            .find(|v| &v.source_key == source_key)
        {
            variant.available = available;
        }
        self.reorder();
        self
    }

    /// Recompute the denormalized primary pointer from the variant list.
    pub fn sync_primary_from_variants(&mut self) {
        if let Some(chosen) = self
            .variants
            .iter()
            .find(|v| v.available)
            .or_else(|| self.variants.first())
        {
            self.primary_source_key = chosen.source_key.clone();
        }
    }

    fn reorder(&mut self) {
        sort_variants(&mut self.variants);
        self.sync_primary_from_variants();
    }

    fn restore_after_removal(mut self) -> Option<Self> {
        if self.variants.is_empty() {
            return None;
        }
        self.reorder();
        Some(self)
    }

    pub fn global_id(&self) -> &GlobalId {
        &self.global_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn year(&self) -> Option<u32> {
        self.year
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn season(&self) -> Option<u32> {
        self.season
    }

    pub fn episode(&self) -> Option<u32> {
        self.episode
    }

    pub fn external_ids(&self) -> &ExternalIds {
        &self.external_ids
    }

    pub fn images(&self) -> &MediaImages {
        &self.images
    }

    pub fn primary_pipeline_id_tag(&self) -> PipelineIdTag {
        self.primary_source_key.pipeline()
    }

    pub fn primary_source_id(&self) -> &str {
        self.primary_source_key.source_id()
    }

    pub fn primary_source_key(&self) -> &SourceKey {
        &self.primary_source_key
    }

    pub fn variants(&self) -> &[MediaVariant] {
        &self.variants
    }

    pub fn primary_variant(&self) -> &MediaVariant {
        // Non-empty by construction.
        &self.variants[0]
    }

    pub fn has_multiple_variants(&self) -> bool {
        self.variants.len() > 1
    }

    pub fn available_variants(&self) -> impl Iterator<Item = &MediaVariant> {
        self.variants.iter().filter(|v| v.available)
    }

    pub fn variant(&self, source_key: &SourceKey) -> Option<&MediaVariant> {
        self.variants.iter().find(|v| &v.source_key == source_key)
    }
}
