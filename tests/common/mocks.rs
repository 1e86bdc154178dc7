use anyhow::{Result, bail};
use async_trait::async_trait;
use fishit_catalog::db::CatalogStore;
use fishit_catalog::models::{
    GlobalId, LinkState, NormalizedMedia, NormalizedMediaMetadata, PipelineIdTag,
    RawMediaMetadata, SourceKey, SourceRef, SourceType, SyncLedgerEntry, SyncMode,
};
use fishit_catalog::services::{
    CatalogEvent, CatalogEventStream, CatalogPipeline, MetadataResolver, ResolvedMetadata,
    ScanCheckpoint,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Delegating store that fails selected writes.
pub struct FailingStore {
    inner: Arc<dyn CatalogStore>,
    poisoned_titles: Mutex<HashSet<String>>,
    fail_chunk: Option<usize>,
    chunk_calls: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: Arc<dyn CatalogStore>) -> Self {
        Self {
            inner,
            poisoned_titles: Mutex::new(HashSet::new()),
            fail_chunk: None,
            chunk_calls: AtomicUsize::new(0),
        }
    }

    /// `put_media` fails for works with this title.
    pub fn poison_title(self, title: &str) -> Self {
        self.poisoned_titles.lock().unwrap().insert(title.to_string());
        self
    }

    /// The `n`-th call (1-based) to `put_source_refs` fails.
    pub fn fail_chunk(mut self, n: usize) -> Self {
        self.fail_chunk = Some(n);
        self
    }
}

#[async_trait]
impl CatalogStore for FailingStore {
    async fn put_source_refs(&self, refs: &[SourceRef]) -> Result<usize> {
        let call = self.chunk_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_chunk == Some(call) {
            bail!("disk full while writing chunk {}", call);
        }
        self.inner.put_source_refs(refs).await
    }

    async fn find_source_ref(&self, key: &SourceKey) -> Result<Option<SourceRef>> {
        self.inner.find_source_ref(key).await
    }

    async fn source_refs_in_state(
        &self,
        source_type: SourceType,
        state: LinkState,
        after: Option<&SourceKey>,
        limit: u64,
    ) -> Result<Vec<SourceRef>> {
        self.inner
            .source_refs_in_state(source_type, state, after, limit)
            .await
    }

    async fn set_link_state(
        &self,
        key: &SourceKey,
        state: LinkState,
        canonical_id: Option<&GlobalId>,
    ) -> Result<()> {
        self.inner.set_link_state(key, state, canonical_id).await
    }

    async fn count_source_refs(
        &self,
        source_type: SourceType,
        state: Option<LinkState>,
    ) -> Result<u64> {
        self.inner.count_source_refs(source_type, state).await
    }

    async fn delete_source_refs(&self, source_type: SourceType) -> Result<u64> {
        self.inner.delete_source_refs(source_type).await
    }

    async fn load_media(&self, id: &GlobalId) -> Result<Option<NormalizedMedia>> {
        self.inner.load_media(id).await
    }

    async fn put_media(&self, media: &NormalizedMedia) -> Result<()> {
        if self.poisoned_titles.lock().unwrap().contains(media.title()) {
            bail!("constraint violation for '{}'", media.title());
        }
        self.inner.put_media(media).await
    }

    async fn delete_media(&self, id: &GlobalId) -> Result<()> {
        self.inner.delete_media(id).await
    }

    async fn page_media(&self, offset: u64, limit: u64) -> Result<Vec<NormalizedMedia>> {
        self.inner.page_media(offset, limit).await
    }

    async fn count_media(&self) -> Result<u64> {
        self.inner.count_media().await
    }

    async fn media_ids_for_pipeline(&self, pipeline: PipelineIdTag) -> Result<Vec<GlobalId>> {
        self.inner.media_ids_for_pipeline(pipeline).await
    }

    async fn media_id_for_source(&self, key: &SourceKey) -> Result<Option<GlobalId>> {
        self.inner.media_id_for_source(key).await
    }

    async fn load_ledger(&self, source_type: SourceType) -> Result<Option<SyncLedgerEntry>> {
        self.inner.load_ledger(source_type).await
    }

    async fn save_ledger(&self, entry: &SyncLedgerEntry) -> Result<()> {
        self.inner.save_ledger(entry).await
    }

    async fn set_backlog_state(
        &self,
        source_type: SourceType,
        pending: bool,
        estimate: u64,
    ) -> Result<()> {
        self.inner
            .set_backlog_state(source_type, pending, estimate)
            .await
    }

    async fn pending_backlogs(&self) -> Result<Vec<SyncLedgerEntry>> {
        self.inner.pending_backlogs().await
    }
}

/// Pipeline over fixed pages that can fail once at a given page and records
/// every checkpoint it was asked to resume from.
pub struct ScriptedPipeline {
    source_type: SourceType,
    pages: Vec<Vec<RawMediaMetadata>>,
    fail_first_scan_at_page: Option<u32>,
    pub resumes: Mutex<Vec<Option<ScanCheckpoint>>>,
}

impl ScriptedPipeline {
    pub fn new(source_type: SourceType, pages: Vec<Vec<RawMediaMetadata>>) -> Self {
        Self {
            source_type,
            pages,
            fail_first_scan_at_page: None,
            resumes: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_first_scan_at(mut self, page: u32) -> Self {
        self.fail_first_scan_at_page = Some(page);
        self
    }
}

impl CatalogPipeline for ScriptedPipeline {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    fn scan(&self, _mode: SyncMode, resume_from: Option<ScanCheckpoint>) -> CatalogEventStream {
        let attempt = {
            let mut resumes = self.resumes.lock().unwrap();
            resumes.push(resume_from);
            resumes.len()
        };
        let fail_at = self.fail_first_scan_at_page.filter(|_| attempt == 1);
        let pages = self.pages.clone();
        let skip = resume_from.map_or(0, |c| c.page as usize);

        Box::pin(async_stream::stream! {
            let mut total_items = 0;
            for (index, items) in pages.into_iter().enumerate().skip(skip) {
                let page = index as u32 + 1;
                if fail_at == Some(page) {
                    yield CatalogEvent::ScanError { reason: format!("timeout on page {}", page) };
                    return;
                }
                for item in items {
                    total_items += 1;
                    yield CatalogEvent::ItemDiscovered(item);
                }
                yield CatalogEvent::PageComplete { page };
            }
            yield CatalogEvent::ScanComplete { total_items };
        })
    }
}

/// Resolver that knows nothing and counts how often it was asked.
#[derive(Default)]
pub struct CountingResolver {
    pub calls: AtomicUsize,
}

impl CountingResolver {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataResolver for CountingResolver {
    async fn resolve(&self, _metadata: &NormalizedMediaMetadata) -> Result<Option<ResolvedMetadata>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    fn resolver_name(&self) -> &'static str {
        "counting"
    }
}
