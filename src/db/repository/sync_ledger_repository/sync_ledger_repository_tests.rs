//! Integration tests for SyncLedgerRepository

#[cfg(test)]
mod tests {
    use crate::db::entities::SyncLedgerActiveModel;
    use crate::db::repository::Repository;
    use crate::db::repository::sync_ledger_repository::*;
    use crate::models::{SourceType, SyncLedgerEntry, SyncMode, SyncStatus};
    use anyhow::Result;
    use chrono::Utc;
    use std::sync::Arc;

    async fn setup_test_repository() -> Result<Arc<SyncLedgerRepositoryImpl>> {
        use crate::db::connection::Database;
        use tempfile::TempDir;

        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("test.db");

        // Need to leak the temp_dir to keep it alive for the test
        let _temp_dir = Box::leak(Box::new(temp_dir));

        let db = Database::connect(&db_path).await?;
        db.migrate().await?;

        Ok(Arc::new(SyncLedgerRepositoryImpl::new(db.get_connection())))
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() -> Result<()> {
        let repo = setup_test_repository().await?;

        let entry = SyncLedgerEntry::new(SourceType::Xtream).start(SyncMode::Full);
        repo.upsert(SyncLedgerActiveModel::from(&entry)).await?;
        assert_eq!(repo.count().await?, 1);

        let running = repo.find_running().await?;
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].source_type, "xtream");
        assert_eq!(running[0].mode.as_deref(), Some("full"));

        let finished = entry.finish(&SyncStatus::Success {
            at: Utc::now(),
            items_synced: 10,
        });
        repo.upsert(SyncLedgerActiveModel::from(&finished)).await?;

        assert_eq!(repo.count().await?, 1);
        assert!(repo.find_running().await?.is_empty());
        let stored = repo.find_by_id("xtream").await?.unwrap();
        assert_eq!(stored.status, "success");
        assert!(stored.completed_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_find_backlog_pending() -> Result<()> {
        let repo = setup_test_repository().await?;

        let mut telegram = SyncLedgerEntry::new(SourceType::Telegram);
        telegram.backlog_pending = true;
        telegram.backlog_estimate = 1200;
        repo.upsert(SyncLedgerActiveModel::from(&telegram)).await?;
        repo.upsert(SyncLedgerActiveModel::from(&SyncLedgerEntry::new(SourceType::Io)))
            .await?;

        let pending = repo.find_backlog_pending().await?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].source_type, "telegram");
        assert_eq!(pending[0].backlog_estimate, 1200);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_ledger_row() -> Result<()> {
        let repo = setup_test_repository().await?;
        repo.upsert(SyncLedgerActiveModel::from(&SyncLedgerEntry::new(SourceType::Plex)))
            .await?;
        repo.delete("plex").await?;
        assert!(repo.find_by_id("plex").await?.is_none());
        assert!(repo.find_all().await?.is_empty());
        Ok(())
    }
}
