use crate::common::builders::{RawItemBuilder, xtream_movies};
use crate::common::mocks::FailingStore;
use crate::common::{TestContext, linker_over, sizing};
use fishit_catalog::db::CatalogStore;
use fishit_catalog::models::{LinkState, RawMediaMetadata, SourceRef, SourceType};
use fishit_catalog::normalizer::{MetadataNormalizer, SceneNameNormalizer};
use fishit_catalog::services::{BatchWriter, DeviceClass};
use fishit_catalog::workers::BacklogWorker;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn defer_all(store: &dyn CatalogStore, items: Vec<RawMediaMetadata>) {
    let normalizer = SceneNameNormalizer::new();
    let refs: Vec<SourceRef> = items
        .into_iter()
        .map(|raw| {
            let normalized = normalizer.normalize(&raw);
            SourceRef::deferred(raw, &normalized).unwrap()
        })
        .collect();
    store.put_source_refs(&refs).await.unwrap();
}

#[tokio::test]
async fn test_one_failing_item_does_not_stop_the_backlog() {
    let context = TestContext::new().await;
    let store: Arc<dyn CatalogStore> =
        Arc::new(FailingStore::new(context.store.clone()).poison_title("Broken Upload"));

    let mut items = xtream_movies(4);
    items.insert(
        2,
        RawItemBuilder::movie("Broken Upload")
            .with_tmdb_id(666)
            .from_source(SourceType::Xtream, "xtream:vod:666")
            .build(),
    );
    defer_all(store.as_ref(), items).await;

    let worker = BacklogWorker::new(
        linker_over(store.clone()),
        sizing(DeviceClass::PhoneTablet),
        Arc::new(BatchWriter::new()),
    );
    let report = worker
        .run(SourceType::Xtream, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.processed, 5);
    assert_eq!(report.linked, 4);
    assert_eq!(report.failed, 1);
    assert!(!report.cancelled);

    let failed = store
        .source_refs_in_state(SourceType::Xtream, LinkState::Failed, None, 10)
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].original_title, "Broken Upload");
    assert_eq!(
        store
            .count_source_refs(SourceType::Xtream, Some(LinkState::Backlog))
            .await
            .unwrap(),
        0
    );
    assert_eq!(store.count_media().await.unwrap(), 4);
}

#[tokio::test]
async fn test_low_ram_backlog_links_in_capped_batches() {
    let context = TestContext::new().await;
    defer_all(context.store.as_ref(), xtream_movies(520)).await;

    let worker = BacklogWorker::new(
        context.linker(),
        sizing(DeviceClass::TvLowRam),
        Arc::new(BatchWriter::new()),
    );
    let report = worker
        .run(SourceType::Xtream, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.processed, 520);
    assert_eq!(report.linked, 520);
    // Keyset pages of 500 and 20, each linked in batches of at most 35.
    assert_eq!(report.chunks, 15 + 1);
    assert_eq!(context.store.count_media().await.unwrap(), 520);
}

#[tokio::test]
async fn test_cancelled_backlog_leaves_items_pending() {
    let context = TestContext::new().await;
    defer_all(context.store.as_ref(), xtream_movies(10)).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let worker = BacklogWorker::new(
        context.linker(),
        sizing(DeviceClass::Tv),
        Arc::new(BatchWriter::new()),
    );
    let report = worker.run(SourceType::Xtream, &cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.processed, 0);
    assert_eq!(
        context
            .store
            .count_source_refs(SourceType::Xtream, Some(LinkState::Backlog))
            .await
            .unwrap(),
        10
    );
}
