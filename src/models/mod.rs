mod identifiers;
pub mod media;
pub mod source_ref;
pub mod sync;

pub use identifiers::{CategoryId, GlobalId, PipelineIdTag, SourceKey};
pub use media::{MediaVariant, NormalizedMedia, QualityTier};
pub use source_ref::{LinkState, SourceRef};
pub use sync::{SyncLedgerEntry, SyncMode, SyncStatus};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::errors::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    SeriesEpisode,
    Live,
    Clip,
    Unknown,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::SeriesEpisode => "series_episode",
            MediaType::Live => "live",
            MediaType::Clip => "clip",
            MediaType::Unknown => "unknown",
        }
    }
}

impl FromStr for MediaType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaType::Movie),
            "series_episode" => Ok(MediaType::SeriesEpisode),
            "live" => Ok(MediaType::Live),
            "clip" => Ok(MediaType::Clip),
            "unknown" => Ok(MediaType::Unknown),
            other => Err(ModelError::unknown("media type", other)),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content source families. Each one syncs independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Telegram,
    Xtream,
    Io,
    Plex,
    Audiobook,
    Other,
}

impl SourceType {
    pub const ALL: [SourceType; 6] = [
        SourceType::Telegram,
        SourceType::Xtream,
        SourceType::Io,
        SourceType::Plex,
        SourceType::Audiobook,
        SourceType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Telegram => "telegram",
            SourceType::Xtream => "xtream",
            SourceType::Io => "io",
            SourceType::Plex => "plex",
            SourceType::Audiobook => "audiobook",
            SourceType::Other => "other",
        }
    }

    pub fn pipeline_id_tag(&self) -> PipelineIdTag {
        PipelineIdTag::from(*self)
    }
}

impl FromStr for SourceType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(SourceType::Telegram),
            "xtream" => Ok(SourceType::Xtream),
            "io" => Ok(SourceType::Io),
            "plex" => Ok(SourceType::Plex),
            "audiobook" => Ok(SourceType::Audiobook),
            "other" => Ok(SourceType::Other),
            other => Err(ModelError::unknown("source type", other)),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalIds {
    pub tmdb_id: Option<u64>,
    pub imdb_id: Option<String>,
}

impl ExternalIds {
    pub fn tmdb(id: u64) -> Self {
        Self {
            tmdb_id: Some(id),
            imdb_id: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tmdb_id.is_none() && self.imdb_id.as_deref().is_none_or(str::is_empty)
    }
}

/// Opaque image reference, passed through the pipeline untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    Http { url: String },
    TelegramThumb { remote_id: String },
    LocalFile { path: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaImages {
    pub poster: Option<ImageRef>,
    pub backdrop: Option<ImageRef>,
    pub thumbnail: Option<ImageRef>,
    pub placeholder: Option<ImageRef>,
}

/// One source's raw description of one item, as produced by a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMediaMetadata {
    pub original_title: String,
    pub media_type: MediaType,
    pub year: Option<u32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub external_ids: ExternalIds,
    pub source_type: SourceType,
    pub source_label: String,
    pub source_id: String,
    pub pipeline_id_tag: PipelineIdTag,
    #[serde(default)]
    pub images: MediaImages,
}

impl RawMediaMetadata {
    pub fn new(
        original_title: impl Into<String>,
        media_type: MediaType,
        source_type: SourceType,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            original_title: original_title.into(),
            media_type,
            year: None,
            season: None,
            episode: None,
            duration_minutes: None,
            external_ids: ExternalIds::default(),
            source_type,
            source_label: source_type.as_str().to_string(),
            source_id: source_id.into(),
            pipeline_id_tag: source_type.pipeline_id_tag(),
            images: MediaImages::default(),
        }
    }

    pub fn with_year(mut self, year: u32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_episode(mut self, season: u32, episode: u32) -> Self {
        self.season = Some(season);
        self.episode = Some(episode);
        self
    }

    pub fn with_duration_minutes(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn with_external_ids(mut self, external_ids: ExternalIds) -> Self {
        self.external_ids = external_ids;
        self
    }

    pub fn with_tmdb_id(mut self, tmdb_id: u64) -> Self {
        self.external_ids.tmdb_id = Some(tmdb_id);
        self
    }

    pub fn with_source_label(mut self, label: impl Into<String>) -> Self {
        self.source_label = label.into();
        self
    }

    pub fn with_images(mut self, images: MediaImages) -> Self {
        self.images = images;
        self
    }

    /// Typed identity of this item; fails only for an empty source id.
    pub fn source_key(&self) -> Result<SourceKey, ModelError> {
        SourceKey::new(self.pipeline_id_tag, self.source_id.clone())
    }
}

/// Cleaned, derived view of one [`RawMediaMetadata`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMediaMetadata {
    pub canonical_title: String,
    pub media_type: MediaType,
    pub year: Option<u32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub duration_minutes: Option<u32>,
    pub tmdb_id: Option<u64>,
    pub external_ids: ExternalIds,
    pub images: MediaImages,
    /// Video height parsed from technical title tags, when present.
    pub quality_height: Option<u32>,
    /// Audio language parsed from title tags, when present.
    pub language_tag: Option<String>,
}
