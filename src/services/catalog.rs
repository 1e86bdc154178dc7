//! Event-driven catalog scanning.
//!
//! A source pipeline exposes its catalog as a finite, ordered stream of
//! [`CatalogEvent`]s. The scheduler consumes it FIFO and commits at page
//! boundaries, so a scan can be cancelled between events and restarted from
//! the last committed [`ScanCheckpoint`].

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::{CategoryId, MediaType, RawMediaMetadata, SourceType, SyncMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCheckpoint {
    /// Last page whose items were durably committed.
    pub page: u32,
}

impl ScanCheckpoint {
    pub fn after_page(page: u32) -> Self {
        Self { page }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent {
    CategoryDiscovered {
        category_id: CategoryId,
        name: String,
        media_type: MediaType,
    },
    ItemDiscovered(RawMediaMetadata),
    /// Every item of `page` has been emitted.
    PageComplete { page: u32 },
    ScanComplete { total_items: usize },
    /// Terminal failure; nothing follows it.
    ScanError { reason: String },
}

pub type CatalogEventStream = BoxStream<'static, CatalogEvent>;

/// A content source able to enumerate its catalog.
pub trait CatalogPipeline: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// Start a scan. With `resume_from`, pages up to and including the
    /// checkpoint are skipped.
    fn scan(&self, mode: SyncMode, resume_from: Option<ScanCheckpoint>) -> CatalogEventStream;
}

/// Pipeline over pre-fetched pages, e.g. a source whose API returns the
/// whole catalog at once.
pub struct PagedCatalogPipeline {
    source_type: SourceType,
    pages: Vec<Vec<RawMediaMetadata>>,
}

impl PagedCatalogPipeline {
    pub fn new(source_type: SourceType, pages: Vec<Vec<RawMediaMetadata>>) -> Self {
        Self { source_type, pages }
    }
}

impl CatalogPipeline for PagedCatalogPipeline {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    fn scan(&self, _mode: SyncMode, resume_from: Option<ScanCheckpoint>) -> CatalogEventStream {
        let pages = self.pages.clone();
        let skip = resume_from.map_or(0, |c| c.page as usize);

        Box::pin(async_stream::stream! {
            let mut total_items = 0;
            for (index, items) in pages.into_iter().enumerate().skip(skip) {
                for item in items {
                    total_items += 1;
                    yield CatalogEvent::ItemDiscovered(item);
                }
                yield CatalogEvent::PageComplete { page: index as u32 + 1 };
            }
            yield CatalogEvent::ScanComplete { total_items };
        })
    }
}
