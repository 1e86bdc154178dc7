use fishit_catalog::models::{MediaType, RawMediaMetadata, SourceType};

/// Builds pipeline output the way a source adapter would emit it.
pub struct RawItemBuilder {
    title: String,
    media_type: MediaType,
    source_type: SourceType,
    source_id: String,
    year: Option<u32>,
    episode: Option<(u32, u32)>,
    tmdb_id: Option<u64>,
    imdb_id: Option<String>,
    label: Option<String>,
}

impl RawItemBuilder {
    pub fn movie(title: &str) -> Self {
        Self::new(title, MediaType::Movie)
    }

    pub fn episode(title: &str, season: u32, episode: u32) -> Self {
        let mut builder = Self::new(title, MediaType::SeriesEpisode);
        builder.episode = Some((season, episode));
        builder
    }

    pub fn channel(title: &str) -> Self {
        Self::new(title, MediaType::Live)
    }

    fn new(title: &str, media_type: MediaType) -> Self {
        Self {
            title: title.to_string(),
            media_type,
            source_type: SourceType::Xtream,
            source_id: format!("xtream:vod:{}", title.to_lowercase().replace(' ', "-")),
            year: None,
            episode: None,
            tmdb_id: None,
            imdb_id: None,
            label: None,
        }
    }

    pub fn from_source(mut self, source_type: SourceType, source_id: &str) -> Self {
        self.source_type = source_type;
        self.source_id = source_id.to_string();
        self
    }

    pub fn with_year(mut self, year: u32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_tmdb_id(mut self, tmdb_id: u64) -> Self {
        self.tmdb_id = Some(tmdb_id);
        self
    }

    pub fn with_imdb_id(mut self, imdb_id: &str) -> Self {
        self.imdb_id = Some(imdb_id.to_string());
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn build(self) -> RawMediaMetadata {
        let mut raw = RawMediaMetadata::new(
            self.title,
            self.media_type,
            self.source_type,
            self.source_id,
        );
        raw.year = self.year;
        if let Some((season, episode)) = self.episode {
            raw = raw.with_episode(season, episode);
        }
        raw.external_ids.tmdb_id = self.tmdb_id;
        raw.external_ids.imdb_id = self.imdb_id;
        if let Some(label) = self.label {
            raw = raw.with_source_label(label);
        }
        raw
    }
}

/// `count` distinct movies from one Xtream panel, each with its own TMDB id.
pub fn xtream_movies(count: usize) -> Vec<RawMediaMetadata> {
    (1..=count)
        .map(|i| {
            RawItemBuilder::movie(&format!("Feature {}", i))
                .from_source(SourceType::Xtream, &format!("xtream:vod:{}", i))
                .with_tmdb_id(10_000 + i as u64)
                .build()
        })
        .collect()
}
