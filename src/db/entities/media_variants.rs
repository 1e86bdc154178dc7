use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "media_variants")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub global_id: String,
    #[sea_orm(unique)]
    pub source_key: String,
    /// Position within the owning work's ordered variant list (0 = primary candidate).
    pub position: i32,
    pub source_label: String,
    pub height: Option<i32>,
    pub video_codec: Option<String>,
    pub container: Option<String>,
    pub language_tag: Option<String>,
    pub size_bytes: Option<i64>,
    pub available: bool,
    pub synthetic: bool,
    pub playback_hints: Json,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::canonical_media::Entity",
        from = "Column::GlobalId",
        to = "super::canonical_media::Column::GlobalId",
        on_delete = "Cascade"
    )]
    CanonicalMedia,
}

impl Related<super::canonical_media::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CanonicalMedia.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
