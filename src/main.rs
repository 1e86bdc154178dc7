use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use fishit_catalog::Config;
use fishit_catalog::db::{Database, SqliteCatalogStore};
use fishit_catalog::events::EventBus;
use fishit_catalog::models::{LinkState, SourceType};
use fishit_catalog::normalizer::normalizer_for;
use fishit_catalog::services::{
    BatchSizing, CanonicalLinker, CanonicalMergeEngine, classifier_from_config,
};
use fishit_catalog::workers::{CatalogSyncScheduler, SchedulerOptions};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fishit_catalog=debug".into()),
        )
        .init();

    info!("Starting FishIT catalog maintenance");

    let config = Config::load()?;

    let database = Database::open(&config.database).await?;
    database.migrate().await?;
    let store = SqliteCatalogStore::shared(database.get_connection());

    let sizing = BatchSizing::new(classifier_from_config(&config.device));
    info!(
        "Device class {}: backfill chunk {}, page size {}",
        sizing.device_class(),
        sizing.backfill_chunk_size(),
        sizing.page_size()
    );

    let events = Arc::new(EventBus::default());
    let engine = CanonicalMergeEngine::with_default_policy(normalizer_for(config.normalizer.mode));
    let linker = Arc::new(CanonicalLinker::new(store.clone(), engine).with_events(events.clone()));

    let scheduler = CatalogSyncScheduler::new(
        store.clone(),
        linker,
        sizing,
        SchedulerOptions::new(config.sync.clone()).with_events(events),
    );

    let resumed = scheduler.resume_pending_backlogs().await?;
    info!("Resumed {} pending backlog(s)", resumed);

    tokio::select! {
        _ = scheduler.wait_all_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping background work");
            scheduler.shutdown().await;
        }
    }

    for source_type in SourceType::ALL {
        let total = store.count_source_refs(source_type, None).await?;
        if total == 0 {
            continue;
        }
        let backlog = store
            .count_source_refs(source_type, Some(LinkState::Backlog))
            .await?;
        info!(
            "{}: {} references, {} awaiting linking",
            source_type, total, backlog
        );
    }
    info!("Catalog holds {} canonical works", store.count_media().await?);

    Ok(())
}
