use super::{BaseRepository, Repository};
use crate::db::entities::{SyncLedger, SyncLedgerActiveModel, SyncLedgerModel, sync_ledger};
use anyhow::Result;
use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, prelude::DateTime,
};
use std::sync::Arc;

/// Repository for the per-source sync ledger
#[async_trait]
pub trait SyncLedgerRepository: Repository<SyncLedgerModel> {
    /// Insert or replace the ledger row of one source type
    async fn upsert(&self, entry: SyncLedgerActiveModel) -> Result<()>;

    /// Set only the backlog columns of one row. Returns the number of rows touched.
    async fn update_backlog(
        &self,
        source_type: &str,
        pending: bool,
        estimate: i64,
        updated_at: DateTime,
    ) -> Result<u64>;

    /// Ledger rows with a backlog still waiting to run
    async fn find_backlog_pending(&self) -> Result<Vec<SyncLedgerModel>>;

    /// Ledger rows left in the running state (process died mid-sync)
    async fn find_running(&self) -> Result<Vec<SyncLedgerModel>>;
}

#[cfg(test)]
mod sync_ledger_repository_tests;

#[derive(Debug)]
pub struct SyncLedgerRepositoryImpl {
    base: BaseRepository,
}

impl SyncLedgerRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl Repository<SyncLedgerModel> for SyncLedgerRepositoryImpl {
    type Entity = SyncLedger;

    async fn find_by_id(&self, id: &str) -> Result<Option<SyncLedgerModel>> {
        Ok(SyncLedger::find_by_id(id.to_string())
            .one(self.base.db.as_ref())
            .await?)
    }

    async fn find_all(&self) -> Result<Vec<SyncLedgerModel>> {
        Ok(SyncLedger::find()
            .order_by_asc(sync_ledger::Column::SourceType)
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn insert(&self, entity: SyncLedgerModel) -> Result<SyncLedgerModel> {
        let active_model = entity.into_active_model().reset_all();
        Ok(active_model.insert(self.base.db.as_ref()).await?)
    }

    async fn update(&self, entity: SyncLedgerModel) -> Result<SyncLedgerModel> {
        let active_model = entity.into_active_model().reset_all();
        Ok(active_model.update(self.base.db.as_ref()).await?)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        SyncLedger::delete_by_id(id.to_string())
            .exec(self.base.db.as_ref())
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(SyncLedger::find().count(self.base.db.as_ref()).await?)
    }
}

#[async_trait]
impl SyncLedgerRepository for SyncLedgerRepositoryImpl {
    async fn upsert(&self, entry: SyncLedgerActiveModel) -> Result<()> {
        let key = match &entry.source_type {
            sea_orm::ActiveValue::Set(key) | sea_orm::ActiveValue::Unchanged(key) => key.clone(),
            sea_orm::ActiveValue::NotSet => anyhow::bail!("Ledger entry without source type"),
        };

        if self.find_by_id(&key).await?.is_some() {
            entry.update(self.base.db.as_ref()).await?;
        } else {
            entry.insert(self.base.db.as_ref()).await?;
        }
        Ok(())
    }

    async fn update_backlog(
        &self,
        source_type: &str,
        pending: bool,
        estimate: i64,
        updated_at: DateTime,
    ) -> Result<u64> {
        let result = SyncLedger::update_many()
            .col_expr(sync_ledger::Column::BacklogPending, Expr::value(pending))
            .col_expr(sync_ledger::Column::BacklogEstimate, Expr::value(estimate))
            .col_expr(sync_ledger::Column::UpdatedAt, Expr::value(updated_at))
            .filter(sync_ledger::Column::SourceType.eq(source_type))
            .exec(self.base.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }

    async fn find_backlog_pending(&self) -> Result<Vec<SyncLedgerModel>> {
        Ok(SyncLedger::find()
            .filter(sync_ledger::Column::BacklogPending.eq(true))
            .order_by_asc(sync_ledger::Column::SourceType)
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn find_running(&self) -> Result<Vec<SyncLedgerModel>> {
        Ok(SyncLedger::find()
            .filter(sync_ledger::Column::Status.eq("running"))
            .all(self.base.db.as_ref())
            .await?)
    }
}
