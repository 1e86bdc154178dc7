//! Device-aware batch sizing and chunked persistence.
//!
//! Every bulk write against the catalog goes through [`BatchWriter`], which
//! commits one chunk per unit of work and never interleaves chunks from two
//! callers. Chunk sizes come from a single [`BatchSizePolicy`] table keyed by
//! [`DeviceClass`] and [`SyncPhase`].

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::models::MediaType;

/// Hard ceiling for every phase on low-RAM TV devices.
pub const LOW_RAM_BATCH_CAP: usize = 35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    TvLowRam,
    Tv,
    PhoneTablet,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceClass::TvLowRam => "tv_low_ram",
            DeviceClass::Tv => "tv",
            DeviceClass::PhoneTablet => "phone_tablet",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    Live,
    Movies,
    Series,
    Episodes,
    Backfill,
    Export,
    TmdbEnrichment,
}

impl SyncPhase {
    pub const ALL: [SyncPhase; 7] = [
        SyncPhase::Live,
        SyncPhase::Movies,
        SyncPhase::Series,
        SyncPhase::Episodes,
        SyncPhase::Backfill,
        SyncPhase::Export,
        SyncPhase::TmdbEnrichment,
    ];

    /// Ingest phase an item of `media_type` belongs to during a scan.
    pub fn for_media_type(media_type: MediaType) -> Self {
        match media_type {
            MediaType::Live => SyncPhase::Live,
            MediaType::SeriesEpisode => SyncPhase::Episodes,
            MediaType::Movie | MediaType::Clip | MediaType::Unknown => SyncPhase::Movies,
        }
    }
}

/// Per-device-class sizing table.
///
/// `backfill_chunk` and `page_size` size keyset reads. Every write batch goes
/// through [`BatchSizePolicy::size_for`], which applies `phase_cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSizePolicy {
    pub phase_cap: Option<usize>,
    pub live: usize,
    pub movies: usize,
    pub series: usize,
    pub episodes: usize,
    pub tmdb_enrichment: usize,
    pub backfill_chunk: usize,
    pub page_size: usize,
}

impl BatchSizePolicy {
    pub const LOW_RAM: Self = Self {
        phase_cap: Some(LOW_RAM_BATCH_CAP),
        live: LOW_RAM_BATCH_CAP,
        movies: LOW_RAM_BATCH_CAP,
        series: LOW_RAM_BATCH_CAP,
        episodes: LOW_RAM_BATCH_CAP,
        tmdb_enrichment: LOW_RAM_BATCH_CAP,
        backfill_chunk: 500,
        page_size: 500,
    };

    pub const NORMAL: Self = Self {
        phase_cap: None,
        live: 600,
        movies: 400,
        series: 200,
        episodes: 200,
        tmdb_enrichment: 100,
        backfill_chunk: 2000,
        page_size: 4000,
    };

    pub fn for_class(class: DeviceClass) -> Self {
        match class {
            DeviceClass::TvLowRam => Self::LOW_RAM,
            DeviceClass::Tv | DeviceClass::PhoneTablet => Self::NORMAL,
        }
    }

    /// Batch size of one phase. On low-RAM devices every phase resolves to
    /// [`LOW_RAM_BATCH_CAP`].
    pub fn size_for(&self, phase: SyncPhase) -> usize {
        let size = match phase {
            SyncPhase::Live => self.live,
            SyncPhase::Movies => self.movies,
            SyncPhase::Series => self.series,
            SyncPhase::Episodes => self.episodes,
            SyncPhase::TmdbEnrichment => self.tmdb_enrichment,
            SyncPhase::Backfill => self.backfill_chunk,
            SyncPhase::Export => self.page_size,
        };
        self.phase_cap.map_or(size, |cap| size.min(cap))
    }
}

/// Coarse device capability source. Implementations must be cheap to call.
pub trait DeviceClassifier: Send + Sync {
    fn device_class(&self) -> DeviceClass;
}

#[derive(Debug, Clone, Copy)]
pub struct StaticDeviceClassifier(pub DeviceClass);

impl DeviceClassifier for StaticDeviceClassifier {
    fn device_class(&self) -> DeviceClass {
        self.0
    }
}

/// Classifies from the TV flag and total RAM; computed once, then cached.
#[derive(Debug)]
pub struct HeuristicDeviceClassifier {
    is_tv: bool,
    total_ram_mb: Option<u64>,
    low_ram_threshold_mb: u64,
    cached: OnceCell<DeviceClass>,
}

impl HeuristicDeviceClassifier {
    pub fn new(is_tv: bool, total_ram_mb: Option<u64>, low_ram_threshold_mb: u64) -> Self {
        Self {
            is_tv,
            total_ram_mb,
            low_ram_threshold_mb,
            cached: OnceCell::new(),
        }
    }

    fn classify(&self) -> DeviceClass {
        if !self.is_tv {
            return DeviceClass::PhoneTablet;
        }
        // A TV with unknown memory is treated as constrained.
        match self.total_ram_mb {
            Some(ram) if ram > self.low_ram_threshold_mb => DeviceClass::Tv,
            _ => DeviceClass::TvLowRam,
        }
    }
}

impl DeviceClassifier for HeuristicDeviceClassifier {
    fn device_class(&self) -> DeviceClass {
        *self.cached.get_or_init(|| {
            let class = self.classify();
            info!(
                "Device classified as {} (tv={}, ram={:?}MB)",
                class, self.is_tv, self.total_ram_mb
            );
            class
        })
    }
}

/// Build the process-wide classifier from the `[device]` config section.
pub fn classifier_from_config(config: &DeviceConfig) -> Arc<dyn DeviceClassifier> {
    match config.class_override {
        Some(class) => Arc::new(StaticDeviceClassifier(class)),
        None => Arc::new(HeuristicDeviceClassifier::new(
            config.is_tv,
            config.total_ram_mb,
            config.low_ram_threshold_mb,
        )),
    }
}

/// Resolves batch, chunk and page sizes, consulting the classifier once per decision.
#[derive(Clone)]
pub struct BatchSizing {
    classifier: Arc<dyn DeviceClassifier>,
}

impl BatchSizing {
    pub fn new(classifier: Arc<dyn DeviceClassifier>) -> Self {
        Self { classifier }
    }

    pub fn device_class(&self) -> DeviceClass {
        self.classifier.device_class()
    }

    pub fn policy(&self) -> BatchSizePolicy {
        BatchSizePolicy::for_class(self.device_class())
    }

    pub fn batch_size(&self, phase: SyncPhase) -> usize {
        self.policy().size_for(phase)
    }

    pub fn sync_live_batch_size(&self) -> usize {
        self.batch_size(SyncPhase::Live)
    }

    pub fn sync_movies_batch_size(&self) -> usize {
        self.batch_size(SyncPhase::Movies)
    }

    pub fn sync_series_batch_size(&self) -> usize {
        self.batch_size(SyncPhase::Series)
    }

    pub fn sync_episodes_batch_size(&self) -> usize {
        self.batch_size(SyncPhase::Episodes)
    }

    pub fn tmdb_enrichment_batch_size(&self) -> usize {
        self.batch_size(SyncPhase::TmdbEnrichment)
    }

    /// Rows read per keyset page of the backlog.
    pub fn backfill_chunk_size(&self) -> usize {
        self.policy().backfill_chunk
    }

    /// Rows read per page of a paged export query.
    pub fn page_size(&self) -> usize {
        self.policy().page_size
    }
}

/// Persists one chunk as one unit of work.
#[async_trait]
pub trait ChunkSink<T: Send + Sync>: Send + Sync {
    async fn commit_chunk(&self, chunk: &[T]) -> Result<()>;

    /// Whether the chunk is one store transaction that must not interleave
    /// with other callers' chunks. Per-item sinks return `false` and commit
    /// without holding the writer lock.
    fn exclusive(&self) -> bool {
        true
    }
}

/// Outcome of a chunked write. Chunks `1..=chunks_committed` are durable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkedWriteReport {
    pub chunks_total: usize,
    pub chunks_committed: usize,
    pub items_committed: usize,
    pub failure: Option<String>,
    pub cancelled: bool,
}

impl ChunkedWriteReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && !self.cancelled && self.chunks_committed == self.chunks_total
    }
}

pub struct BatchWriter {
    write_lock: Mutex<()>,
    pacing: Option<Duration>,
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchWriter {
    pub fn new() -> Self {
        Self {
            write_lock: Mutex::new(()),
            pacing: None,
        }
    }

    /// Pause between chunks, giving readers and rate-limited upstreams room.
    pub fn with_pacing(mut self, pacing: Option<Duration>) -> Self {
        self.pacing = pacing;
        self
    }

    /// Write `items` in consecutive chunks of `chunk_size`.
    ///
    /// Stops at the first failing chunk, leaving the committed prefix in place.
    /// Cancellation is only observed between chunks.
    pub async fn write_chunked<T, S>(
        &self,
        items: &[T],
        chunk_size: usize,
        sink: &S,
        cancel: &CancellationToken,
    ) -> ChunkedWriteReport
    where
        T: Send + Sync,
        S: ChunkSink<T> + ?Sized,
    {
        let chunk_size = chunk_size.max(1);
        let mut report = ChunkedWriteReport {
            chunks_total: items.len().div_ceil(chunk_size),
            ..Default::default()
        };

        for (index, chunk) in items.chunks(chunk_size).enumerate() {
            if cancel.is_cancelled() {
                info!(
                    "Chunked write cancelled after {}/{} chunks",
                    report.chunks_committed, report.chunks_total
                );
                report.cancelled = true;
                break;
            }

            let committed = if sink.exclusive() {
                let _guard = self.write_lock.lock().await;
                sink.commit_chunk(chunk).await
            } else {
                sink.commit_chunk(chunk).await
            };

            match committed {
                Ok(()) => {
                    report.chunks_committed += 1;
                    report.items_committed += chunk.len();
                    debug!(
                        "Committed chunk {}/{} ({} items)",
                        index + 1,
                        report.chunks_total,
                        chunk.len()
                    );
                }
                Err(e) => {
                    warn!(
                        "Chunk {}/{} failed, keeping {} committed items: {:#}",
                        index + 1,
                        report.chunks_total,
                        report.items_committed,
                        e
                    );
                    report.failure = Some(format!("{:#}", e));
                    break;
                }
            }

            let is_last = index + 1 == report.chunks_total;
            if let (Some(pacing), false) = (self.pacing, is_last) {
                tokio::select! {
                    _ = tokio::time::sleep(pacing) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        report
    }

    /// Write with the chunk size the device policy assigns to `phase`.
    pub async fn write_phase<T, S>(
        &self,
        items: &[T],
        phase: SyncPhase,
        sizing: &BatchSizing,
        sink: &S,
        cancel: &CancellationToken,
    ) -> ChunkedWriteReport
    where
        T: Send + Sync,
        S: ChunkSink<T> + ?Sized,
    {
        self.write_chunked(items, sizing.batch_size(phase), sink, cancel)
            .await
    }
}
