use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "source_refs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub source_key: String,
    pub source_type: String,
    pub source_label: String,
    pub media_type: String,
    pub original_title: String,
    pub canonical_title: String,
    pub link_state: String, // 'backlog', 'singleton', 'linked', 'failed'
    pub canonical_id: Option<String>,
    /// The full raw metadata as ingested, replayed by the backlog worker.
    pub raw: Json,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
