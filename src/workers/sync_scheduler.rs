use anyhow::{Context, Result};
use chrono::Utc;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backlog_worker::BacklogWorker;
use super::sinks::{LinkFailureMode, LinkingSink, SourceRefSink};
use crate::config::SyncConfig;
use crate::db::CatalogStore;
use crate::events::{EventBus, EventSubscriber, SyncEventType};
use crate::models::{
    LinkState, RawMediaMetadata, SourceRef, SourceType, SyncLedgerEntry, SyncMode, SyncStatus,
};
use crate::services::batching::{BatchSizing, BatchWriter, ChunkedWriteReport, SyncPhase};
use crate::services::canonical_linker::CanonicalLinker;
use crate::services::catalog::{CatalogEvent, CatalogPipeline, ScanCheckpoint};
use crate::services::runtime_guard::{GuardDecision, RuntimeGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTrigger {
    Started,
    AlreadyRunning,
    /// A runtime guard blocked the start; state is unchanged.
    Deferred(String),
    NoPipeline,
}

pub struct SchedulerOptions {
    pub config: SyncConfig,
    pub guard: RuntimeGuard,
    pub events: Arc<EventBus>,
}

impl SchedulerOptions {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            guard: RuntimeGuard::unrestricted(),
            events: Arc::new(EventBus::default()),
        }
    }

    pub fn with_guard(mut self, guard: RuntimeGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }
}

struct ActiveTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveTask {
    fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }
}

#[derive(Debug, Default)]
struct ScanProgress {
    items_persisted: usize,
    pages_committed: u32,
    deferred: u64,
    cancelled: bool,
}

struct SchedulerInner {
    store: Arc<dyn CatalogStore>,
    linker: Arc<CanonicalLinker>,
    sizing: BatchSizing,
    writer: Arc<BatchWriter>,
    guard: RuntimeGuard,
    events: Arc<EventBus>,
    config: SyncConfig,
    pipelines: RwLock<HashMap<SourceType, Arc<dyn CatalogPipeline>>>,
    statuses: RwLock<HashMap<SourceType, SyncStatus>>,
    active_syncs: Mutex<HashMap<SourceType, ActiveTask>>,
    backlogs: Mutex<HashMap<SourceType, ActiveTask>>,
}

/// Per-source catalog sync orchestration.
///
/// Each source runs in its own task; sources never wait on each other except
/// at the shared [`BatchWriter`], which commits one transactional chunk at a
/// time.
#[derive(Clone)]
pub struct CatalogSyncScheduler {
    inner: Arc<SchedulerInner>,
}

impl CatalogSyncScheduler {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        linker: Arc<CanonicalLinker>,
        sizing: BatchSizing,
        options: SchedulerOptions,
    ) -> Self {
        let writer = BatchWriter::new().with_pacing(options.config.chunk_pacing());
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                linker,
                sizing,
                writer: Arc::new(writer),
                guard: options.guard,
                events: options.events,
                config: options.config,
                pipelines: RwLock::new(HashMap::new()),
                statuses: RwLock::new(HashMap::new()),
                active_syncs: Mutex::new(HashMap::new()),
                backlogs: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub async fn register_pipeline(&self, pipeline: Arc<dyn CatalogPipeline>) {
        let source_type = pipeline.source_type();
        info!("Registered catalog pipeline for {}", source_type);
        self.inner
            .pipelines
            .write()
            .await
            .insert(source_type, pipeline);
    }

    pub async fn status(&self, source_type: SourceType) -> SyncStatus {
        self.inner
            .statuses
            .read()
            .await
            .get(&source_type)
            .cloned()
            .unwrap_or(SyncStatus::Idle)
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    pub fn subscribe(&self) -> EventSubscriber {
        self.inner.events.subscribe()
    }

    pub async fn trigger_sync(&self, source_type: SourceType, mode: SyncMode) -> SyncTrigger {
        let Some(pipeline) = self.inner.pipelines.read().await.get(&source_type).cloned() else {
            warn!("No catalog pipeline registered for {}", source_type);
            return SyncTrigger::NoPipeline;
        };

        let mut active = self.inner.active_syncs.lock().await;
        if active.get(&source_type).is_some_and(ActiveTask::is_live) {
            debug!("Sync for {} already running", source_type);
            return SyncTrigger::AlreadyRunning;
        }

        if let GuardDecision::Defer(reason) = self.inner.guard.check() {
            info!("Sync for {} deferred: {}", source_type, reason);
            self.inner
                .events
                .emit_sync_deferred(source_type, reason.clone())
                .await;
            return SyncTrigger::Deferred(reason);
        }

        self.inner
            .set_status(
                source_type,
                SyncStatus::Running {
                    mode,
                    items_persisted: 0,
                    pages_committed: 0,
                },
            )
            .await;

        let cancel = CancellationToken::new();
        let inner = self.inner.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            inner.run_sync(pipeline, source_type, mode, task_cancel).await;
        });
        active.insert(source_type, ActiveTask { cancel, handle });

        SyncTrigger::Started
    }

    /// Stop a running sync after its in-flight chunk. Returns whether one was running.
    pub async fn cancel_sync(&self, source_type: SourceType) -> bool {
        match self.inner.active_syncs.lock().await.get(&source_type) {
            Some(task) if task.is_live() => {
                info!("Cancelling sync for {}", source_type);
                task.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Schedule deferred linking for `source_type`, replacing any pending run.
    pub async fn schedule_backlog_processing(
        &self,
        source_type: SourceType,
        estimated_item_count: u64,
        delay: Option<Duration>,
    ) -> Result<()> {
        let delay = delay.unwrap_or_else(|| self.inner.config.backlog_delay());
        self.inner
            .clone()
            .schedule_backlog(source_type, estimated_item_count, delay)
            .await
    }

    /// Idempotent. Returns whether a backlog run was pending or active.
    pub async fn cancel_backlog_processing(&self, source_type: SourceType) -> Result<bool> {
        let cancelled = match self.inner.backlogs.lock().await.remove(&source_type) {
            Some(task) => {
                task.cancel.cancel();
                task.is_live()
            }
            None => false,
        };

        if let Some(ledger) = self.inner.store.load_ledger(source_type).await?
            && ledger.backlog_pending
        {
            self.inner
                .store
                .set_backlog_state(source_type, false, ledger.backlog_estimate)
                .await?;
        }

        if cancelled {
            info!("Backlog processing for {} cancelled", source_type);
            self.inner
                .events
                .emit_backlog(SyncEventType::BacklogCancelled, source_type, 0, 0, 0, 0)
                .await;
        }
        Ok(cancelled)
    }

    /// Reschedule every backlog the ledger still marks pending. Returns how many.
    pub async fn resume_pending_backlogs(&self) -> Result<usize> {
        let pending = self
            .inner
            .store
            .pending_backlogs()
            .await
            .context("Failed to read pending backlogs")?;

        for entry in &pending {
            info!(
                "Resuming backlog for {} (~{} items)",
                entry.source_type, entry.backlog_estimate
            );
            self.inner
                .clone()
                .schedule_backlog(
                    entry.source_type,
                    entry.backlog_estimate,
                    self.inner.config.backlog_delay(),
                )
                .await?;
        }
        Ok(pending.len())
    }

    pub async fn is_syncing(&self, source_type: SourceType) -> bool {
        self.inner
            .active_syncs
            .lock()
            .await
            .get(&source_type)
            .is_some_and(ActiveTask::is_live)
    }

    pub async fn is_backlog_active(&self, source_type: SourceType) -> bool {
        self.inner
            .backlogs
            .lock()
            .await
            .get(&source_type)
            .is_some_and(ActiveTask::is_live)
    }

    /// Wait until neither a sync nor a backlog run is active for `source_type`.
    pub async fn wait_idle(&self, source_type: SourceType) {
        loop {
            if !self.is_syncing(source_type).await && !self.is_backlog_active(source_type).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_all_idle(&self) {
        let sources: Vec<SourceType> = {
            let syncs = self.inner.active_syncs.lock().await;
            let backlogs = self.inner.backlogs.lock().await;
            syncs.keys().chain(backlogs.keys()).copied().collect()
        };
        for source_type in sources {
            self.wait_idle(source_type).await;
        }
    }

    /// Cancel every running sync and backlog.
    pub async fn shutdown(&self) {
        for task in self.inner.active_syncs.lock().await.values() {
            task.cancel.cancel();
        }
        for task in self.inner.backlogs.lock().await.values() {
            task.cancel.cancel();
        }
        self.wait_all_idle().await;
        info!("Catalog sync scheduler stopped");
    }
}

impl SchedulerInner {
    async fn set_status(&self, source_type: SourceType, status: SyncStatus) {
        self.statuses.write().await.insert(source_type, status);
    }

    async fn run_sync(
        self: Arc<Self>,
        pipeline: Arc<dyn CatalogPipeline>,
        source_type: SourceType,
        mode: SyncMode,
        cancel: CancellationToken,
    ) {
        info!("Starting {} sync for {}", mode.as_str(), source_type);
        let start_time = Instant::now();
        self.events
            .emit_sync(SyncEventType::SyncStarted, source_type, mode, 0, 0, None)
            .await;

        let mut ledger = match self.store.load_ledger(source_type).await {
            Ok(entry) => entry.unwrap_or_else(|| SyncLedgerEntry::new(source_type)),
            Err(e) => {
                warn!("Could not read sync ledger for {}: {:#}", source_type, e);
                SyncLedgerEntry::new(source_type)
            }
        };

        let result = self
            .perform_scan(pipeline, source_type, mode, &cancel, &mut ledger)
            .await;

        let (status, event_type, progress) = match result {
            Ok(progress) if progress.cancelled => (
                SyncStatus::Cancelled {
                    at: Utc::now(),
                    items_synced: progress.items_persisted,
                },
                SyncEventType::SyncCancelled,
                progress,
            ),
            Ok(progress) => (
                SyncStatus::Success {
                    at: Utc::now(),
                    items_synced: progress.items_persisted,
                },
                SyncEventType::SyncCompleted,
                progress,
            ),
            Err((e, progress)) => {
                error!("Sync failed for {}: {}", source_type, e);
                let error_chain: Vec<String> = e.chain().map(|err| err.to_string()).collect();
                error!("Error chain for {}: {:?}", source_type, error_chain);
                (
                    SyncStatus::Failed {
                        reason: format!("{:#}", e),
                        at: Utc::now(),
                    },
                    SyncEventType::SyncFailed,
                    progress,
                )
            }
        };

        let ledger = ledger.finish(&status);
        if let Err(e) = self.store.save_ledger(&ledger).await {
            warn!("Could not record sync outcome for {}: {:#}", source_type, e);
        }
        let backlog_estimate = if progress.deferred > 0 {
            self.mark_backlog_pending(source_type).await
        } else {
            0
        };

        info!(
            "{} sync for {} ended as {} after {:?}: {} items, {} pages, {} deferred",
            mode.as_str(),
            source_type,
            status,
            start_time.elapsed(),
            progress.items_persisted,
            progress.pages_committed,
            progress.deferred
        );

        let error = match &status {
            SyncStatus::Failed { reason, .. } => Some(reason.clone()),
            _ => None,
        };
        let succeeded = matches!(status, SyncStatus::Success { .. });
        self.set_status(source_type, status).await;
        self.events
            .emit_sync(
                event_type,
                source_type,
                mode,
                progress.items_persisted,
                progress.pages_committed,
                error,
            )
            .await;

        // Failed or cancelled runs keep the backlog pending for the next start.
        if succeeded
            && backlog_estimate > 0
            && let Err(e) = self
                .clone()
                .schedule_backlog(source_type, backlog_estimate, self.config.backlog_delay())
                .await
        {
            warn!("Could not schedule backlog for {}: {:#}", source_type, e);
        }
    }

    /// Consume the scan FIFO, committing at page boundaries, batch-size limits
    /// and phase changes.
    async fn perform_scan(
        &self,
        pipeline: Arc<dyn CatalogPipeline>,
        source_type: SourceType,
        mode: SyncMode,
        cancel: &CancellationToken,
        ledger: &mut SyncLedgerEntry,
    ) -> Result<ScanProgress, (anyhow::Error, ScanProgress)> {
        let resume_from = match (mode, ledger.checkpoint) {
            (SyncMode::Full, Some(page)) if ledger.mode == Some(SyncMode::Full) => {
                Some(ScanCheckpoint::after_page(page))
            }
            _ => None,
        };
        let carried_items = if resume_from.is_some() {
            ledger.items_persisted
        } else {
            0
        };

        *ledger = ledger.clone().start(mode);
        let mut progress = ScanProgress::default();
        if let Some(checkpoint) = resume_from {
            info!(
                "Resuming {} scan of {} after page {}",
                mode.as_str(),
                source_type,
                checkpoint.page
            );
            ledger.checkpoint = Some(checkpoint.page);
            ledger.items_persisted = carried_items;
            progress.pages_committed = checkpoint.page;
        }
        if let Err(e) = self.store.save_ledger(ledger).await {
            return Err((e, progress));
        }

        let link_inline = match mode {
            SyncMode::Full => self.config.link_on_initial_sync,
            SyncMode::Incremental => self.config.link_on_incremental_sync,
        };

        let mut stream = pipeline.scan(mode, resume_from);
        let mut buffer: Vec<RawMediaMetadata> = Vec::new();
        let mut phase: Option<SyncPhase> = None;

        loop {
            let event = tokio::select! {
                event = stream.next() => event,
                _ = cancel.cancelled() => {
                    progress.cancelled = true;
                    break;
                }
            };
            let Some(event) = event else {
                break;
            };

            match event {
                CatalogEvent::CategoryDiscovered {
                    category_id, name, ..
                } => {
                    debug!("{}: category {} ({})", source_type, name, category_id);
                }
                CatalogEvent::ItemDiscovered(raw) => {
                    let item_phase = SyncPhase::for_media_type(raw.media_type);
                    if phase.is_some_and(|p| p != item_phase) && !buffer.is_empty() {
                        let current = phase.unwrap_or(item_phase);
                        if let Err(e) = self
                            .flush(&mut buffer, current, link_inline, cancel, &mut progress)
                            .await
                        {
                            return Err((e, progress));
                        }
                    }
                    phase = Some(item_phase);
                    buffer.push(raw);

                    if buffer.len() >= self.sizing.batch_size(item_phase)
                        && let Err(e) = self
                            .flush(&mut buffer, item_phase, link_inline, cancel, &mut progress)
                            .await
                    {
                        return Err((e, progress));
                    }
                }
                CatalogEvent::PageComplete { page } => {
                    if let Some(current) = phase
                        && let Err(e) = self
                            .flush(&mut buffer, current, link_inline, cancel, &mut progress)
                            .await
                    {
                        return Err((e, progress));
                    }
                    if progress.cancelled {
                        break;
                    }

                    progress.pages_committed = page;
                    ledger.checkpoint = Some(page);
                    ledger.items_persisted = (carried_items + progress.items_persisted as u64)
                        .max(ledger.items_persisted);
                    ledger.updated_at = Utc::now();
                    if let Err(e) = self.store.save_ledger(ledger).await {
                        return Err((e, progress));
                    }

                    self.statuses.write().await.insert(
                        source_type,
                        SyncStatus::Running {
                            mode,
                            items_persisted: progress.items_persisted,
                            pages_committed: page,
                        },
                    );
                    self.events
                        .emit_sync(
                            SyncEventType::SyncProgress,
                            source_type,
                            mode,
                            progress.items_persisted,
                            page,
                            None,
                        )
                        .await;
                }
                CatalogEvent::ScanComplete { total_items } => {
                    debug!("{} reported {} items", source_type, total_items);
                    break;
                }
                CatalogEvent::ScanError { reason } => {
                    // Keep what the scan delivered before failing.
                    if let Some(current) = phase
                        && let Err(e) = self
                            .flush(&mut buffer, current, link_inline, cancel, &mut progress)
                            .await
                    {
                        return Err((e, progress));
                    }
                    return Err((
                        anyhow::anyhow!("Catalog scan failed: {}", reason),
                        progress,
                    ));
                }
            }

            if progress.cancelled {
                break;
            }
        }

        if !progress.cancelled
            && let Some(current) = phase
            && let Err(e) = self
                .flush(&mut buffer, current, link_inline, cancel, &mut progress)
                .await
        {
            return Err((e, progress));
        }

        Ok(progress)
    }

    async fn flush(
        &self,
        buffer: &mut Vec<RawMediaMetadata>,
        phase: SyncPhase,
        link_inline: bool,
        cancel: &CancellationToken,
        progress: &mut ScanProgress,
    ) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        let items = std::mem::take(buffer);

        let report = if link_inline {
            let sink = LinkingSink::new(
                self.linker.clone(),
                self.sizing.clone(),
                LinkFailureMode::Defer,
            );
            let report = self
                .writer
                .write_phase(&items, phase, &self.sizing, &sink, cancel)
                .await;
            progress.deferred += sink.tally().deferred as u64;
            report
        } else {
            let mut refs = Vec::with_capacity(items.len());
            for raw in &items {
                let normalized = self.linker.normalize_only(raw);
                match SourceRef::deferred(raw.clone(), &normalized) {
                    Ok(source_ref) => refs.push(source_ref),
                    Err(e) => warn!("Skipping unaddressable item '{}': {}", raw.original_title, e),
                }
            }
            let sink = SourceRefSink::new(self.store.clone());
            let report = self
                .writer
                .write_phase(&refs, phase, &self.sizing, &sink, cancel)
                .await;
            progress.deferred += committed_backlog(&refs, &report, self.sizing.batch_size(phase));
            report
        };

        progress.items_persisted += report.items_committed;
        if report.cancelled {
            progress.cancelled = true;
        }
        match report.failure {
            Some(failure) => Err(anyhow::anyhow!(
                "Chunk {}/{} failed: {}",
                report.chunks_committed + 1,
                report.chunks_total,
                failure
            )),
            None => Ok(()),
        }
    }

    async fn schedule_backlog(
        self: Arc<Self>,
        source_type: SourceType,
        estimated_item_count: u64,
        delay: Duration,
    ) -> Result<()> {
        let mut backlogs = self.backlogs.lock().await;
        if let Some(previous) = backlogs.remove(&source_type) {
            debug!("Replacing pending backlog for {}", source_type);
            previous.cancel.cancel();
        }

        self.store
            .set_backlog_state(source_type, true, estimated_item_count)
            .await?;

        info!(
            "Backlog processing for {} scheduled in {:?} (~{} items)",
            source_type, delay, estimated_item_count
        );
        self.events
            .emit_backlog(
                SyncEventType::BacklogScheduled,
                source_type,
                estimated_item_count,
                0,
                0,
                0,
            )
            .await;

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let inner = self.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = task_cancel.cancelled() => return,
            }
            inner
                .run_backlog(source_type, estimated_item_count, task_cancel)
                .await;
        });
        backlogs.insert(source_type, ActiveTask { cancel, handle });
        Ok(())
    }

    async fn run_backlog(
        &self,
        source_type: SourceType,
        estimated_item_count: u64,
        cancel: CancellationToken,
    ) {
        self.events
            .emit_backlog(
                SyncEventType::BacklogStarted,
                source_type,
                estimated_item_count,
                0,
                0,
                0,
            )
            .await;

        let worker = BacklogWorker::new(self.linker.clone(), self.sizing.clone(), self.writer.clone())
            .with_pause(self.config.backlog_pause());

        match worker.run(source_type, &cancel).await {
            Ok(report) => {
                if !report.cancelled
                    && let Err(e) = self.clear_backlog_pending(source_type).await
                {
                    warn!("Could not clear backlog flag for {}: {:#}", source_type, e);
                }
                self.events
                    .emit_backlog(
                        SyncEventType::BacklogCompleted,
                        source_type,
                        estimated_item_count,
                        report.processed,
                        report.linked,
                        report.failed,
                    )
                    .await;
            }
            Err(e) => {
                // The ledger keeps the backlog pending for the next start.
                error!("Backlog processing for {} failed: {:#}", source_type, e);
            }
        }
    }

    async fn clear_backlog_pending(&self, source_type: SourceType) -> Result<()> {
        let remaining = self
            .store
            .count_source_refs(source_type, Some(LinkState::Backlog))
            .await?;
        self.store
            .set_backlog_state(source_type, remaining > 0, remaining)
            .await
    }

    /// Flag the source's unlinked references for a later backlog run.
    /// Returns the flagged count.
    async fn mark_backlog_pending(&self, source_type: SourceType) -> u64 {
        let flagged = async {
            let remaining = self
                .store
                .count_source_refs(source_type, Some(LinkState::Backlog))
                .await?;
            self.store
                .set_backlog_state(source_type, remaining > 0, remaining)
                .await?;
            anyhow::Ok(remaining)
        }
        .await;

        flagged.unwrap_or_else(|e| {
            warn!("Could not flag backlog for {}: {:#}", source_type, e);
            0
        })
    }
}

/// Deferred references among the committed prefix of a fast-path write.
fn committed_backlog(refs: &[SourceRef], report: &ChunkedWriteReport, chunk_size: usize) -> u64 {
    let committed = (report.chunks_committed * chunk_size.max(1)).min(refs.len());
    refs[..committed]
        .iter()
        .filter(|r| r.link_state == LinkState::Backlog)
        .count() as u64
}
