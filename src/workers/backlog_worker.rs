use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::sinks::{LinkFailureMode, LinkingSink};
use crate::db::CatalogStore;
use crate::models::{LinkState, RawMediaMetadata, SourceKey, SourceType};
use crate::services::batching::{BatchSizing, BatchWriter, SyncPhase};
use crate::services::canonical_linker::CanonicalLinker;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BacklogReport {
    /// Link chunks committed, each at most one write batch of the device.
    pub chunks: usize,
    pub processed: usize,
    pub linked: usize,
    pub singletons: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Promotes `Backlog` references of one source through the linker.
pub struct BacklogWorker {
    store: Arc<dyn CatalogStore>,
    linker: Arc<CanonicalLinker>,
    sizing: BatchSizing,
    writer: Arc<BatchWriter>,
    pause: Option<Duration>,
}

impl BacklogWorker {
    pub fn new(
        linker: Arc<CanonicalLinker>,
        sizing: BatchSizing,
        writer: Arc<BatchWriter>,
    ) -> Self {
        Self {
            store: linker.store().clone(),
            linker,
            sizing,
            writer,
            pause: None,
        }
    }

    /// Pause between backfill chunks.
    pub fn with_pause(mut self, pause: Option<Duration>) -> Self {
        self.pause = pause;
        self
    }

    pub async fn run(&self, source_type: SourceType, cancel: &CancellationToken) -> Result<BacklogReport> {
        let start = Instant::now();
        let chunk_size = self.sizing.backfill_chunk_size();
        let mut report = BacklogReport::default();
        let mut after: Option<SourceKey> = None;

        info!(
            "Backlog processing for {} started (page {}, write batch {})",
            source_type,
            chunk_size,
            self.sizing.batch_size(SyncPhase::Backfill)
        );

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let refs = self
                .store
                .source_refs_in_state(source_type, LinkState::Backlog, after.as_ref(), chunk_size as u64)
                .await?;
            let Some(last) = refs.last() else {
                break;
            };
            after = Some(last.source_key.clone());

            let items: Vec<RawMediaMetadata> = refs.into_iter().map(|r| r.raw).collect();
            let sink = LinkingSink::new(
                self.linker.clone(),
                self.sizing.clone(),
                LinkFailureMode::MarkFailed,
            )
                .with_cancellation(cancel.clone());
            let written = self
                .writer
                .write_phase(&items, SyncPhase::Backfill, &self.sizing, &sink, cancel)
                .await;

            let tally = sink.tally();
            report.chunks += written.chunks_committed;
            report.processed += tally.processed;
            report.linked += tally.linked;
            report.singletons += tally.singletons;
            report.failed += tally.failed;
            debug!(
                "Backlog chunk for {}: {} processed, {} failed",
                source_type, tally.processed, tally.failed
            );

            if let Some(failure) = written.failure {
                anyhow::bail!("Backlog chunk for {} failed: {}", source_type, failure);
            }
            if written.cancelled || cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if items.len() < chunk_size {
                break;
            }

            if let Some(pause) = self.pause {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        info!(
            "Backlog processing for {} finished in {:?}: {} processed, {} linked, {} singletons, {} failed{}",
            source_type,
            start.elapsed(),
            report.processed,
            report.linked,
            report.singletons,
            report.failed,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }
}
