pub mod builders;
pub mod mocks;

use fishit_catalog::config::SyncConfig;
use fishit_catalog::db::{CatalogStore, Database, SqliteCatalogStore};
use fishit_catalog::normalizer::SceneNameNormalizer;
use fishit_catalog::services::{
    BatchSizing, CanonicalLinker, CanonicalMergeEngine, DeviceClass, StaticDeviceClassifier,
};
use fishit_catalog::workers::{CatalogSyncScheduler, SchedulerOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestContext {
    pub store: Arc<dyn CatalogStore>,
    pub db_path: PathBuf,
    _temp_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let db = Database::connect(&db_path)
            .await
            .expect("Failed to connect to test database");
        db.migrate().await.expect("Failed to run migrations");

        Self {
            store: SqliteCatalogStore::shared(db.get_connection()),
            db_path,
            _temp_dir: temp_dir,
        }
    }

    /// A second handle on the same database file, as after a process restart.
    pub async fn reopen(&self) -> Arc<dyn CatalogStore> {
        let db = Database::connect(&self.db_path)
            .await
            .expect("Failed to reopen test database");
        SqliteCatalogStore::shared(db.get_connection())
    }

    pub fn linker(&self) -> Arc<CanonicalLinker> {
        linker_over(self.store.clone())
    }

    pub fn scheduler(&self, class: DeviceClass, config: SyncConfig) -> CatalogSyncScheduler {
        scheduler_over(self.store.clone(), class, config)
    }
}

pub fn linker_over(store: Arc<dyn CatalogStore>) -> Arc<CanonicalLinker> {
    let engine = CanonicalMergeEngine::with_default_policy(Arc::new(SceneNameNormalizer::new()));
    Arc::new(CanonicalLinker::new(store, engine))
}

pub fn sizing(class: DeviceClass) -> BatchSizing {
    BatchSizing::new(Arc::new(StaticDeviceClassifier(class)))
}

pub fn scheduler_over(
    store: Arc<dyn CatalogStore>,
    class: DeviceClass,
    config: SyncConfig,
) -> CatalogSyncScheduler {
    CatalogSyncScheduler::new(
        store.clone(),
        linker_over(store),
        sizing(class),
        SchedulerOptions::new(config),
    )
}

pub fn immediate_backlog() -> SyncConfig {
    SyncConfig {
        backlog_delay_ms: 0,
        ..SyncConfig::default()
    }
}
