use crate::common::builders::xtream_movies;
use crate::common::mocks::FailingStore;
use crate::common::{TestContext, sizing};
use fishit_catalog::config::DeviceConfig;
use fishit_catalog::models::{SourceRef, SourceType};
use fishit_catalog::normalizer::{MetadataNormalizer, SceneNameNormalizer};
use fishit_catalog::services::batching::LOW_RAM_BATCH_CAP;
use fishit_catalog::services::{
    BatchSizing, BatchWriter, DeviceClass, SyncPhase, classifier_from_config,
};
use fishit_catalog::workers::SourceRefSink;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn deferred_refs(count: usize) -> Vec<SourceRef> {
    let normalizer = SceneNameNormalizer::new();
    xtream_movies(count)
        .into_iter()
        .map(|raw| {
            let normalized = normalizer.normalize(&raw);
            SourceRef::deferred(raw, &normalized).unwrap()
        })
        .collect()
}

#[test]
fn test_low_ram_tv_caps_every_phase() {
    let config = DeviceConfig {
        is_tv: true,
        total_ram_mb: Some(1024),
        ..DeviceConfig::default()
    };
    let sizing = BatchSizing::new(classifier_from_config(&config));

    assert_eq!(sizing.device_class(), DeviceClass::TvLowRam);
    for phase in SyncPhase::ALL {
        assert_eq!(sizing.batch_size(phase), LOW_RAM_BATCH_CAP, "{:?}", phase);
    }
    assert_eq!(sizing.backfill_chunk_size(), 500);
    assert_eq!(sizing.page_size(), 500);
}

#[test]
fn test_configured_class_wins_over_detection() {
    let config = DeviceConfig {
        class_override: Some(DeviceClass::PhoneTablet),
        is_tv: true,
        total_ram_mb: Some(512),
        ..DeviceConfig::default()
    };
    let sizing = BatchSizing::new(classifier_from_config(&config));

    assert_eq!(sizing.device_class(), DeviceClass::PhoneTablet);
    assert_eq!(sizing.sync_live_batch_size(), 600);
    assert_eq!(sizing.sync_movies_batch_size(), 400);
}

#[tokio::test]
async fn test_failed_chunk_keeps_committed_prefix() {
    let context = TestContext::new().await;
    let store = Arc::new(FailingStore::new(context.store.clone()).fail_chunk(3));
    let sink = SourceRefSink::new(store);
    let refs = deferred_refs(100);

    let report = BatchWriter::new()
        .write_phase(
            &refs,
            SyncPhase::Movies,
            &sizing(DeviceClass::TvLowRam),
            &sink,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.chunks_total, 3);
    assert_eq!(report.chunks_committed, 2);
    assert_eq!(report.items_committed, 70);
    assert!(report.failure.unwrap().contains("disk full"));
    assert_eq!(
        context
            .store
            .count_source_refs(SourceType::Xtream, None)
            .await
            .unwrap(),
        70
    );
}

#[tokio::test]
async fn test_cancelled_write_commits_nothing_further() {
    let context = TestContext::new().await;
    let sink = SourceRefSink::new(context.store.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = BatchWriter::new()
        .write_chunked(&deferred_refs(10), 5, &sink, &cancel)
        .await;

    assert!(report.cancelled);
    assert_eq!(report.items_committed, 0);
    assert_eq!(
        context
            .store
            .count_source_refs(SourceType::Xtream, None)
            .await
            .unwrap(),
        0
    );
}
