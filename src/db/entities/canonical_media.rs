use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "canonical_media")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub global_id: String,
    pub title: String,
    pub year: Option<i32>,
    pub media_type: String, // 'movie', 'series_episode', 'clip', 'unknown'
    pub season: Option<i32>,
    pub episode: Option<i32>,
    pub tmdb_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub images: Option<Json>,
    /// Serialized source key of the current primary variant.
    pub primary_source_key: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::media_variants::Entity")]
    Variants,
}

impl Related<super::media_variants::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Variants.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
