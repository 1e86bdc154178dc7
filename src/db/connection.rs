use anyhow::{Context, Result};
use sea_orm::sqlx::sqlite::SqliteJournalMode;
use sea_orm::{ConnectOptions, Database as SeaOrmDatabase, DatabaseConnection as SeaOrmConnection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;

pub type DatabaseConnection = Arc<SeaOrmConnection>;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

pub struct Database {
    connection: DatabaseConnection,
}

impl Database {
    /// Open the catalog database described by the `[database]` config section.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        let path = match &config.path {
            Some(path) => path.clone(),
            None => Self::db_path()?,
        };
        Self::connect_with(&path, config.max_connections).await
    }

    /// Connect to a specific database path
    pub async fn connect(path: &Path) -> Result<Self> {
        Self::connect_with(path, DEFAULT_MAX_CONNECTIONS).await
    }

    pub async fn connect_with(path: &Path, max_connections: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", path.display());
        info!("Connecting to catalog database at: {}", db_url);

        let mut opt = ConnectOptions::new(db_url);
        opt.max_connections(max_connections.max(1))
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false)
            // Applied to every pooled connection, not only the first one.
            .map_sqlx_sqlite_opts(|opts| {
                opts.foreign_keys(true)
                    .journal_mode(SqliteJournalMode::Wal)
            });

        let connection = SeaOrmDatabase::connect(opt)
            .await
            .context("Failed to connect to database")?;

        Ok(Self {
            connection: Arc::new(connection),
        })
    }

    pub fn get_connection(&self) -> DatabaseConnection {
        self.connection.clone()
    }

    /// `<data_dir>/fishit/catalog.db`
    pub fn db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().context("Failed to get data directory")?;
        Ok(data_dir.join("fishit").join("catalog.db"))
    }

    pub async fn migrate(&self) -> Result<()> {
        use crate::db::migrations::Migrator;
        use sea_orm_migration::MigratorTrait;

        let pending_count = Migrator::get_pending_migrations(&*self.connection)
            .await
            .context("Failed to get pending migrations")?
            .len();

        if pending_count > 0 {
            info!("Applying {} catalog migration(s)", pending_count);
            Migrator::up(&*self.connection, None)
                .await
                .context("Failed to run migrations")?;
        } else {
            info!("No pending migrations to apply");
        }

        Ok(())
    }
}
