use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::db::CatalogStore;
use crate::models::{LinkState, RawMediaMetadata, SourceRef};
use crate::services::batching::{BatchSizing, ChunkSink};
use crate::services::canonical_linker::{CanonicalLinker, LinkOutcome};

/// Fast-path sink: one chunk of source references per transaction, no linking.
pub struct SourceRefSink {
    store: Arc<dyn CatalogStore>,
}

impl SourceRefSink {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ChunkSink<SourceRef> for SourceRefSink {
    async fn commit_chunk(&self, chunk: &[SourceRef]) -> Result<()> {
        self.store.put_source_refs(chunk).await?;
        Ok(())
    }
}

/// What happens to an item whose link attempt raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFailureMode {
    /// Backlog: mark the reference `Failed` so the pass moves on.
    MarkFailed,
    /// Inline sync: persist it for the backlog to retry.
    Defer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkTally {
    pub processed: usize,
    pub linked: usize,
    pub created: usize,
    pub singletons: usize,
    pub failed: usize,
    pub deferred: usize,
}

/// Links each item of a chunk independently; one bad item never fails the chunk.
///
/// The chunk is enriched up front, then linked item by item. Each link
/// serializes on its own work, so the sink does not take the writer lock.
pub struct LinkingSink {
    linker: Arc<CanonicalLinker>,
    sizing: BatchSizing,
    failure_mode: LinkFailureMode,
    cancel: Option<CancellationToken>,
    tally: Mutex<LinkTally>,
}

impl LinkingSink {
    pub fn new(
        linker: Arc<CanonicalLinker>,
        sizing: BatchSizing,
        failure_mode: LinkFailureMode,
    ) -> Self {
        Self {
            linker,
            sizing,
            failure_mode,
            cancel: None,
            tally: Mutex::new(LinkTally::default()),
        }
    }

    /// Stop between items once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn tally(&self) -> LinkTally {
        self.tally.lock().map(|t| *t).unwrap_or_default()
    }

    fn record(&self, update: impl FnOnce(&mut LinkTally)) {
        if let Ok(mut tally) = self.tally.lock() {
            tally.processed += 1;
            update(&mut tally);
        }
    }

    async fn handle_failure(&self, raw: &RawMediaMetadata) -> Result<()> {
        match self.failure_mode {
            LinkFailureMode::MarkFailed => {
                let key = raw.source_key()?;
                self.linker
                    .store()
                    .set_link_state(&key, LinkState::Failed, None)
                    .await
            }
            LinkFailureMode::Defer => {
                let normalized = self.linker.normalize_only(raw);
                let deferred = SourceRef::deferred(raw.clone(), &normalized)?;
                self.linker.store().put_source_refs(&[deferred]).await?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ChunkSink<RawMediaMetadata> for LinkingSink {
    async fn commit_chunk(&self, chunk: &[RawMediaMetadata]) -> Result<()> {
        let prepared = self.linker.prepare_batch(chunk, &self.sizing).await;
        for (raw, normalized) in chunk.iter().zip(prepared) {
            if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                break;
            }

            match self.linker.link_prepared(raw, normalized).await {
                Ok(LinkOutcome::Linked { created, .. }) => self.record(|t| {
                    t.linked += 1;
                    if created {
                        t.created += 1;
                    }
                }),
                Ok(LinkOutcome::Singleton) => self.record(|t| t.singletons += 1),
                Err(e) => {
                    warn!(
                        "Failed to link {}:{} ('{}'): {:#}",
                        raw.pipeline_id_tag.code(),
                        raw.source_id,
                        raw.original_title,
                        e
                    );
                    if let Err(e) = self.handle_failure(raw).await {
                        warn!("Could not record link failure for {}: {:#}", raw.source_id, e);
                    }
                    let mode = self.failure_mode;
                    self.record(|t| match mode {
                        LinkFailureMode::MarkFailed => t.failed += 1,
                        LinkFailureMode::Defer => t.deferred += 1,
                    });
                }
            }
        }
        Ok(())
    }

    fn exclusive(&self) -> bool {
        false
    }
}
