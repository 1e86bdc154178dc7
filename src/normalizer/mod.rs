//! Raw → normalized metadata conversion.
//!
//! Normalizers are pure and deterministic: the same [`RawMediaMetadata`]
//! always yields the same [`NormalizedMediaMetadata`].

pub mod scene_parser;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{MediaType, NormalizedMediaMetadata, RawMediaMetadata};
pub use scene_parser::{ParsedTitle, SceneNameParser};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizerMode {
    #[default]
    Scene,
    Passthrough,
}

pub trait MetadataNormalizer: Send + Sync {
    fn normalize(&self, raw: &RawMediaMetadata) -> NormalizedMediaMetadata;
}

/// Copies the raw fields through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughNormalizer;

impl MetadataNormalizer for PassThroughNormalizer {
    fn normalize(&self, raw: &RawMediaMetadata) -> NormalizedMediaMetadata {
        NormalizedMediaMetadata {
            canonical_title: raw.original_title.clone(),
            media_type: raw.media_type,
            year: raw.year,
            season: raw.season,
            episode: raw.episode,
            duration_minutes: raw.duration_minutes,
            tmdb_id: raw.external_ids.tmdb_id,
            external_ids: raw.external_ids.clone(),
            images: raw.images.clone(),
            quality_height: None,
            language_tag: None,
        }
    }
}

/// Cleans release-style titles and fills year/season/episode the source did
/// not provide. Values supplied by the source always win over parsed ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneNameNormalizer {
    parser: SceneNameParser,
}

impl SceneNameNormalizer {
    pub fn new() -> Self {
        Self {
            parser: SceneNameParser::new(),
        }
    }
}

impl MetadataNormalizer for SceneNameNormalizer {
    fn normalize(&self, raw: &RawMediaMetadata) -> NormalizedMediaMetadata {
        // Channel names are not release names.
        if raw.media_type == MediaType::Live {
            let mut normalized = PassThroughNormalizer.normalize(raw);
            normalized.canonical_title = raw.original_title.trim().to_string();
            return normalized;
        }

        let parsed = self.parser.parse(&raw.original_title);
        let season = raw.season.or(parsed.season);
        let episode = raw.episode.or(parsed.episode);

        let media_type = match raw.media_type {
            MediaType::Unknown if season.is_some() && episode.is_some() => {
                MediaType::SeriesEpisode
            }
            MediaType::Unknown if raw.year.or(parsed.year).is_some() => MediaType::Movie,
            other => other,
        };

        NormalizedMediaMetadata {
            canonical_title: parsed.cleaned_title,
            media_type,
            year: raw.year.or(parsed.year),
            season,
            episode,
            duration_minutes: raw.duration_minutes,
            tmdb_id: raw.external_ids.tmdb_id,
            external_ids: raw.external_ids.clone(),
            images: raw.images.clone(),
            quality_height: parsed.quality_height,
            language_tag: parsed.language_tag,
        }
    }
}

pub fn normalizer_for(mode: NormalizerMode) -> Arc<dyn MetadataNormalizer> {
    match mode {
        NormalizerMode::Scene => Arc::new(SceneNameNormalizer::new()),
        NormalizerMode::Passthrough => Arc::new(PassThroughNormalizer),
    }
}
