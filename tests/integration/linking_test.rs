use crate::common::TestContext;
use crate::common::builders::RawItemBuilder;
use fishit_catalog::models::{LinkState, PipelineIdTag, SourceType};
use fishit_catalog::services::{LinkOutcome, VariantService};
use fishit_catalog::utils::CatalogError;

#[tokio::test]
async fn test_live_channels_never_link_across_sources() {
    let context = TestContext::new().await;
    let linker = context.linker();

    for (source, id) in [
        (SourceType::Xtream, "xtream:live:1"),
        (SourceType::Io, "io:m3u:das-erste"),
    ] {
        let raw = RawItemBuilder::channel("Das Erste HD")
            .from_source(source, id)
            .with_tmdb_id(1)
            .build();
        assert_eq!(linker.link(&raw).await.unwrap(), LinkOutcome::Singleton);
    }

    assert_eq!(context.store.count_media().await.unwrap(), 0);
    assert_eq!(
        context
            .store
            .count_source_refs(SourceType::Io, Some(LinkState::Singleton))
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_items_without_identity_never_group() {
    let context = TestContext::new().await;
    let linker = context.linker();

    let telegram = RawItemBuilder::movie("Heat")
        .with_year(1995)
        .from_source(SourceType::Telegram, "telegram:100:5")
        .build();
    let xtream = RawItemBuilder::movie("Heat")
        .with_year(1995)
        .from_source(SourceType::Xtream, "xtream:vod:5")
        .build();

    assert_eq!(linker.link(&telegram).await.unwrap(), LinkOutcome::Singleton);
    assert_eq!(linker.link(&xtream).await.unwrap(), LinkOutcome::Singleton);
    assert_eq!(context.store.count_media().await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_sources_converge_on_one_work() {
    let context = TestContext::new().await;
    let linker = context.linker();

    let items = [
        (SourceType::Telegram, "telegram:1:1"),
        (SourceType::Xtream, "xtream:vod:1"),
        (SourceType::Io, "io:/movies/heat.mkv"),
        (SourceType::Plex, "plex:movie:17"),
    ]
    .map(|(source, id)| {
        RawItemBuilder::movie("Heat")
            .with_imdb_id("tt0113277")
            .from_source(source, id)
            .build()
    });

    let handles: Vec<_> = items
        .into_iter()
        .map(|raw| {
            let linker = linker.clone();
            tokio::spawn(async move { linker.link(&raw).await })
        })
        .collect();

    let mut global_ids = Vec::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            LinkOutcome::Linked { global_id, .. } => global_ids.push(global_id),
            LinkOutcome::Singleton => panic!("every item carries an IMDb id"),
        }
    }
    global_ids.dedup();
    assert_eq!(global_ids.len(), 1);

    let work = context
        .store
        .load_media(&global_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(work.variants().len(), 4);
    assert_eq!(work.primary_pipeline_id_tag(), PipelineIdTag::Io);
}

#[tokio::test]
async fn test_series_episodes_link_per_episode() {
    let context = TestContext::new().await;
    let linker = context.linker();

    let e1 = RawItemBuilder::episode("Dark", 1, 1)
        .with_tmdb_id(70523)
        .from_source(SourceType::Xtream, "xtream:episode:9:1:1")
        .build();
    let e2 = RawItemBuilder::episode("Dark", 1, 2)
        .with_tmdb_id(70523)
        .from_source(SourceType::Xtream, "xtream:episode:9:1:2")
        .build();
    let e1_elsewhere = RawItemBuilder::episode("Dark S01E01 German 1080p", 1, 1)
        .with_tmdb_id(70523)
        .from_source(SourceType::Telegram, "telegram:44:901")
        .build();

    linker.link(&e1).await.unwrap();
    linker.link(&e2).await.unwrap();
    linker.link(&e1_elsewhere).await.unwrap();

    assert_eq!(context.store.count_media().await.unwrap(), 2);
}

#[tokio::test]
async fn test_variant_selection_after_linking() {
    let context = TestContext::new().await;
    let linker = context.linker();

    let sd = RawItemBuilder::movie("Heat 1995 720p German")
        .with_tmdb_id(949)
        .from_source(SourceType::Telegram, "telegram:1:1")
        .build();
    let hd = RawItemBuilder::movie("Heat 1995 1080p English")
        .with_tmdb_id(949)
        .from_source(SourceType::Telegram, "telegram:1:2")
        .build();

    let LinkOutcome::Linked { global_id, .. } = linker.link(&sd).await.unwrap() else {
        panic!("expected a link");
    };
    linker.link(&hd).await.unwrap();
    let store = context.store.as_ref();

    let german = VariantService::select_best_variant(store, &global_id, Some("de"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(german.source_key.source_id(), "telegram:1:1");

    // Floor removes the German 720p copy.
    let floored = VariantService::select_best_variant(store, &global_id, Some("de"), Some(1080))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(floored.source_key.source_id(), "telegram:1:2");

    // Marking the HD copy unavailable leaves only the SD copy.
    let hd_key = hd.source_key().unwrap();
    assert!(linker.set_variant_availability(&hd_key, false).await.unwrap());
    let remaining = VariantService::select_best_variant(store, &global_id, None, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(remaining.source_key.source_id(), "telegram:1:1");
}

#[tokio::test]
async fn test_unknown_work_is_reported() {
    let context = TestContext::new().await;
    let missing = fishit_catalog::models::GlobalId::from_canonical_key("movie:tmdb:1");

    let err = VariantService::select_best_variant(context.store.as_ref(), &missing, None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CatalogError>(),
        Some(CatalogError::WorkNotFound(_))
    ));
}

#[tokio::test]
async fn test_pruning_a_source_keeps_other_variants() {
    let context = TestContext::new().await;
    let linker = context.linker();

    let xtream = RawItemBuilder::movie("Alien")
        .with_tmdb_id(348)
        .from_source(SourceType::Xtream, "xtream:vod:3")
        .build();
    let telegram = RawItemBuilder::movie("Alien 1979")
        .with_tmdb_id(348)
        .from_source(SourceType::Telegram, "telegram:7:7")
        .build();
    let only_xtream = RawItemBuilder::movie("Ronin")
        .with_tmdb_id(8195)
        .from_source(SourceType::Xtream, "xtream:vod:4")
        .build();
    for raw in [&xtream, &telegram, &only_xtream] {
        linker.link(raw).await.unwrap();
    }

    let report = linker.prune_source(SourceType::Xtream).await.unwrap();
    assert_eq!(report.works_updated, 1);
    assert_eq!(report.works_deleted, 1);
    assert_eq!(report.refs_deleted, 2);

    let works = context.store.page_media(0, 10).await.unwrap();
    assert_eq!(works.len(), 1);
    assert_eq!(works[0].primary_pipeline_id_tag(), PipelineIdTag::Telegram);
}
