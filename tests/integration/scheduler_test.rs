use crate::common::builders::{RawItemBuilder, xtream_movies};
use crate::common::mocks::{CountingResolver, ScriptedPipeline};
use crate::common::{TestContext, immediate_backlog, scheduler_over, sizing};
use fishit_catalog::config::SyncConfig;
use fishit_catalog::models::{GlobalId, LinkState, SourceType, SyncMode, SyncStatus};
use fishit_catalog::normalizer::SceneNameNormalizer;
use fishit_catalog::services::{
    BatchWriter, CanonicalLinker, CanonicalMergeEngine, DeviceClass, EnrichmentService,
    ScanCheckpoint,
};
use fishit_catalog::workers::{BacklogWorker, CatalogSyncScheduler, SchedulerOptions, SyncTrigger};
use tokio_util::sync::CancellationToken;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_low_ram_full_sync_commits_in_capped_chunks() {
    let context = TestContext::new().await;
    let scheduler = context.scheduler(DeviceClass::TvLowRam, immediate_backlog());

    let mut first_page = xtream_movies(100);
    first_page.push(
        RawItemBuilder::channel("Arte HD")
            .from_source(SourceType::Xtream, "xtream:live:3")
            .build(),
    );
    scheduler
        .register_pipeline(Arc::new(ScriptedPipeline::new(
            SourceType::Xtream,
            vec![first_page],
        )))
        .await;

    assert_eq!(
        scheduler.trigger_sync(SourceType::Xtream, SyncMode::Full).await,
        SyncTrigger::Started
    );
    scheduler.wait_idle(SourceType::Xtream).await;

    assert!(matches!(
        scheduler.status(SourceType::Xtream).await,
        SyncStatus::Success {
            items_synced: 101,
            ..
        }
    ));
    assert_eq!(context.store.count_media().await.unwrap(), 100);
    assert_eq!(
        context
            .store
            .count_source_refs(SourceType::Xtream, Some(LinkState::Singleton))
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_sources_sync_independently() {
    let context = TestContext::new().await;
    let scheduler = context.scheduler(DeviceClass::PhoneTablet, immediate_backlog());

    scheduler
        .register_pipeline(Arc::new(
            ScriptedPipeline::new(
                SourceType::Telegram,
                vec![
                    vec![
                        RawItemBuilder::movie("Heat 1995 1080p")
                            .with_tmdb_id(949)
                            .from_source(SourceType::Telegram, "telegram:12:1")
                            .build(),
                    ],
                    vec![],
                ],
            )
            .failing_first_scan_at(2),
        ))
        .await;
    scheduler
        .register_pipeline(Arc::new(ScriptedPipeline::new(
            SourceType::Xtream,
            vec![vec![
                RawItemBuilder::movie("Heat")
                    .with_tmdb_id(949)
                    .from_source(SourceType::Xtream, "xtream:vod:949")
                    .build(),
            ]],
        )))
        .await;

    scheduler
        .trigger_sync(SourceType::Telegram, SyncMode::Full)
        .await;
    scheduler.trigger_sync(SourceType::Xtream, SyncMode::Full).await;
    scheduler.wait_all_idle().await;

    assert!(matches!(
        scheduler.status(SourceType::Telegram).await,
        SyncStatus::Failed { .. }
    ));
    assert!(matches!(
        scheduler.status(SourceType::Xtream).await,
        SyncStatus::Success { .. }
    ));

    // The failed source keeps its backlog flagged for the next start.
    let telegram = context
        .store
        .load_ledger(SourceType::Telegram)
        .await
        .unwrap()
        .unwrap();
    assert!(telegram.backlog_pending);
    assert_eq!(telegram.checkpoint, Some(1));

    let works = context.store.page_media(0, 10).await.unwrap();
    assert_eq!(works.len(), 1);
    assert_eq!(works[0].variants().len(), 1);
}

#[tokio::test]
async fn test_restart_resumes_scan_and_backlog() {
    let context = TestContext::new().await;
    let config = SyncConfig {
        backlog_delay_ms: 0,
        ..SyncConfig::default()
    };
    let pages = vec![
        xtream_movies(3),
        vec![
            RawItemBuilder::movie("Ronin")
                .with_tmdb_id(8195)
                .from_source(SourceType::Xtream, "xtream:vod:8195")
                .build(),
        ],
    ];

    let before = context.scheduler(DeviceClass::Tv, config.clone());
    before
        .register_pipeline(Arc::new(
            ScriptedPipeline::new(SourceType::Xtream, pages.clone()).failing_first_scan_at(2),
        ))
        .await;
    before.trigger_sync(SourceType::Xtream, SyncMode::Full).await;
    before.wait_idle(SourceType::Xtream).await;
    assert_eq!(context.store.count_media().await.unwrap(), 0);

    // New process: fresh store handle and scheduler over the same database.
    let store = context.reopen().await;
    let after = scheduler_over(store.clone(), DeviceClass::Tv, config);
    let pipeline = Arc::new(ScriptedPipeline::new(SourceType::Xtream, pages));
    after.register_pipeline(pipeline.clone()).await;

    assert_eq!(after.resume_pending_backlogs().await.unwrap(), 1);
    after.trigger_sync(SourceType::Xtream, SyncMode::Full).await;
    after.wait_idle(SourceType::Xtream).await;

    assert_eq!(
        *pipeline.resumes.lock().unwrap(),
        vec![Some(ScanCheckpoint::after_page(1))]
    );
    assert_eq!(store.count_media().await.unwrap(), 4);
    let ledger = store.load_ledger(SourceType::Xtream).await.unwrap().unwrap();
    assert_eq!(ledger.status, "success");
    assert_eq!(ledger.items_persisted, 4);
    assert!(!ledger.backlog_pending);
}

#[tokio::test]
async fn test_cancelled_backlog_does_not_run() {
    let context = TestContext::new().await;
    let scheduler = context.scheduler(DeviceClass::Tv, SyncConfig::default());
    scheduler
        .register_pipeline(Arc::new(ScriptedPipeline::new(
            SourceType::Io,
            vec![vec![
                RawItemBuilder::movie("Alien")
                    .with_tmdb_id(348)
                    .from_source(SourceType::Io, "io:/movies/alien.mkv")
                    .build(),
            ]],
        )))
        .await;

    scheduler.trigger_sync(SourceType::Io, SyncMode::Full).await;
    while scheduler.is_syncing(SourceType::Io).await {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(scheduler.is_backlog_active(SourceType::Io).await);

    assert!(scheduler.cancel_backlog_processing(SourceType::Io).await.unwrap());
    scheduler.wait_idle(SourceType::Io).await;

    assert_eq!(context.store.count_media().await.unwrap(), 0);
    assert!(context.store.pending_backlogs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resync_with_corrected_id_moves_variant() {
    let context = TestContext::new().await;
    let scheduler = context.scheduler(DeviceClass::Tv, immediate_backlog());
    let scan = |tmdb_id: u64| {
        Arc::new(ScriptedPipeline::new(
            SourceType::Xtream,
            vec![vec![
                RawItemBuilder::movie("Heat")
                    .with_tmdb_id(tmdb_id)
                    .from_source(SourceType::Xtream, "xtream:vod:1")
                    .build(),
            ]],
        ))
    };

    scheduler.register_pipeline(scan(949)).await;
    scheduler.trigger_sync(SourceType::Xtream, SyncMode::Full).await;
    scheduler.wait_idle(SourceType::Xtream).await;
    let old = GlobalId::from_canonical_key("movie:tmdb:949");
    assert!(context.store.load_media(&old).await.unwrap().is_some());

    // The upstream id was corrected; the full scan rewrites the reference as backlog.
    scheduler.register_pipeline(scan(8195)).await;
    scheduler.trigger_sync(SourceType::Xtream, SyncMode::Full).await;
    scheduler.wait_idle(SourceType::Xtream).await;

    let new = GlobalId::from_canonical_key("movie:tmdb:8195");
    assert!(context.store.load_media(&old).await.unwrap().is_none());
    let work = context.store.load_media(&new).await.unwrap().unwrap();
    assert_eq!(work.variants().len(), 1);
    assert_eq!(context.store.count_media().await.unwrap(), 1);

    let key = RawItemBuilder::movie("Heat")
        .from_source(SourceType::Xtream, "xtream:vod:1")
        .build()
        .source_key()
        .unwrap();
    let reference = context.store.find_source_ref(&key).await.unwrap().unwrap();
    assert_eq!(reference.link_state, LinkState::Linked);
    assert_eq!(reference.canonical_id, Some(new));
}

#[tokio::test]
async fn test_full_sync_leaves_enrichment_to_the_backlog() {
    let context = TestContext::new().await;
    let resolver = Arc::new(CountingResolver::default());
    let engine = CanonicalMergeEngine::with_default_policy(Arc::new(SceneNameNormalizer::new()));
    let linker = Arc::new(
        CanonicalLinker::new(context.store.clone(), engine)
            .with_enrichment(Arc::new(EnrichmentService::new(resolver.clone()))),
    );
    let scheduler = CatalogSyncScheduler::new(
        context.store.clone(),
        linker.clone(),
        sizing(DeviceClass::Tv),
        SchedulerOptions::new(SyncConfig::default()),
    );
    scheduler
        .register_pipeline(Arc::new(ScriptedPipeline::new(
            SourceType::Xtream,
            vec![xtream_movies(50)],
        )))
        .await;

    scheduler.trigger_sync(SourceType::Xtream, SyncMode::Full).await;
    while scheduler.is_syncing(SourceType::Xtream).await {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(resolver.calls(), 0);
    assert!(scheduler.cancel_backlog_processing(SourceType::Xtream).await.unwrap());

    let report = BacklogWorker::new(linker, sizing(DeviceClass::Tv), Arc::new(BatchWriter::new()))
        .run(SourceType::Xtream, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.linked, 50);
    assert_eq!(resolver.calls(), 50);
}
