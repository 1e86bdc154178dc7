//! Entity <-> model mapping for the catalog tables

use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::Set;
use serde::{Serialize, de::DeserializeOwned};

use crate::db::entities::{
    CanonicalMediaActiveModel, CanonicalMediaModel, MediaVariantActiveModel, MediaVariantModel,
    SourceRefActiveModel, SourceRefModel, SyncLedgerActiveModel, SyncLedgerModel,
};
use crate::models::{
    ExternalIds, GlobalId, MediaVariant, NormalizedMedia, SourceKey, SourceRef,
    SyncLedgerEntry, SyncMode,
};
use crate::utils::errors::{CatalogError, CatalogResult};

pub struct DateTimeTransformer;

impl DateTimeTransformer {
    pub fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        dt.and_utc()
    }

    pub fn from_naive_opt(dt: Option<NaiveDateTime>) -> Option<DateTime<Utc>> {
        dt.map(|dt| dt.and_utc())
    }

    pub fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }
}

pub struct JsonTransformer;

impl JsonTransformer {
    pub fn encode<T: Serialize>(value: &T) -> CatalogResult<serde_json::Value> {
        Ok(serde_json::to_value(value)?)
    }

    pub fn decode<T: DeserializeOwned>(value: serde_json::Value) -> CatalogResult<T> {
        Ok(serde_json::from_value(value)?)
    }
}

/// SQLite integers are signed; counts and ids are clamped rather than wrapped.
fn to_i32(value: Option<u32>) -> Option<i32> {
    value.map(|v| i32::try_from(v).unwrap_or(i32::MAX))
}

fn to_u32(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

impl TryFrom<SourceRefModel> for SourceRef {
    type Error = CatalogError;

    fn try_from(model: SourceRefModel) -> Result<Self, Self::Error> {
        Ok(Self {
            source_key: model.source_key.parse()?,
            source_type: model.source_type.parse()?,
            source_label: model.source_label,
            media_type: model.media_type.parse()?,
            original_title: model.original_title,
            canonical_title: model.canonical_title,
            link_state: model.link_state.parse()?,
            canonical_id: model.canonical_id.as_deref().map(GlobalId::parse).transpose()?,
            raw: JsonTransformer::decode(model.raw)?,
            updated_at: DateTimeTransformer::from_naive(model.updated_at),
        })
    }
}

pub fn source_ref_to_active_model(source_ref: &SourceRef) -> CatalogResult<SourceRefActiveModel> {
    Ok(SourceRefActiveModel {
        source_key: Set(source_ref.source_key.to_serialized_string()),
        source_type: Set(source_ref.source_type.as_str().to_string()),
        source_label: Set(source_ref.source_label.clone()),
        media_type: Set(source_ref.media_type.as_str().to_string()),
        original_title: Set(source_ref.original_title.clone()),
        canonical_title: Set(source_ref.canonical_title.clone()),
        link_state: Set(source_ref.link_state.as_str().to_string()),
        canonical_id: Set(source_ref.canonical_id.as_ref().map(|id| id.to_string())),
        raw: Set(JsonTransformer::encode(&source_ref.raw)?),
        updated_at: Set(DateTimeTransformer::to_naive(source_ref.updated_at)),
    })
}

impl TryFrom<SyncLedgerModel> for SyncLedgerEntry {
    type Error = CatalogError;

    fn try_from(model: SyncLedgerModel) -> Result<Self, Self::Error> {
        Ok(Self {
            source_type: model.source_type.parse()?,
            status: model.status,
            mode: model.mode.as_deref().map(str::parse::<SyncMode>).transpose()?,
            checkpoint: to_u32(model.checkpoint),
            items_persisted: model.items_persisted.max(0) as u64,
            backlog_pending: model.backlog_pending,
            backlog_estimate: model.backlog_estimate.max(0) as u64,
            last_error: model.last_error,
            started_at: DateTimeTransformer::from_naive_opt(model.started_at),
            completed_at: DateTimeTransformer::from_naive_opt(model.completed_at),
            updated_at: DateTimeTransformer::from_naive(model.updated_at),
        })
    }
}

impl From<&SyncLedgerEntry> for SyncLedgerActiveModel {
    fn from(entry: &SyncLedgerEntry) -> Self {
        Self {
            source_type: Set(entry.source_type.as_str().to_string()),
            status: Set(entry.status.clone()),
            mode: Set(entry.mode.map(|m| m.as_str().to_string())),
            checkpoint: Set(to_i32(entry.checkpoint)),
            items_persisted: Set(i64::try_from(entry.items_persisted).unwrap_or(i64::MAX)),
            backlog_pending: Set(entry.backlog_pending),
            backlog_estimate: Set(i64::try_from(entry.backlog_estimate).unwrap_or(i64::MAX)),
            last_error: Set(entry.last_error.clone()),
            started_at: Set(entry.started_at.map(DateTimeTransformer::to_naive)),
            completed_at: Set(entry.completed_at.map(DateTimeTransformer::to_naive)),
            updated_at: Set(DateTimeTransformer::to_naive(entry.updated_at)),
        }
    }
}

impl TryFrom<MediaVariantModel> for MediaVariant {
    type Error = CatalogError;

    fn try_from(model: MediaVariantModel) -> Result<Self, Self::Error> {
        Ok(Self {
            source_key: model.source_key.parse::<SourceKey>()?,
            source_label: model.source_label,
            height: to_u32(model.height),
            video_codec: model.video_codec,
            container: model.container,
            language_tag: model.language_tag,
            size_bytes: model.size_bytes.and_then(|s| u64::try_from(s).ok()),
            available: model.available,
            synthetic: model.synthetic,
            playback_hints: JsonTransformer::decode(model.playback_hints)?,
        })
    }
}

pub fn variant_to_active_model(
    global_id: &GlobalId,
    position: usize,
    variant: &MediaVariant,
) -> CatalogResult<MediaVariantActiveModel> {
    Ok(MediaVariantActiveModel {
        id: sea_orm::NotSet,
        global_id: Set(global_id.to_string()),
        source_key: Set(variant.source_key.to_serialized_string()),
        position: Set(i32::try_from(position).unwrap_or(i32::MAX)),
        source_label: Set(variant.source_label.clone()),
        height: Set(to_i32(variant.height)),
        video_codec: Set(variant.video_codec.clone()),
        container: Set(variant.container.clone()),
        language_tag: Set(variant.language_tag.clone()),
        size_bytes: Set(variant.size_bytes.and_then(|s| i64::try_from(s).ok())),
        available: Set(variant.available),
        synthetic: Set(variant.synthetic),
        playback_hints: Set(JsonTransformer::encode(&variant.playback_hints)?),
        updated_at: Set(Utc::now().naive_utc()),
    })
}

pub fn canonical_media_to_active_model(
    media: &NormalizedMedia,
) -> CatalogResult<CanonicalMediaActiveModel> {
    let now = Utc::now().naive_utc();
    Ok(CanonicalMediaActiveModel {
        global_id: Set(media.global_id().to_string()),
        title: Set(media.title().to_string()),
        year: Set(to_i32(media.year())),
        media_type: Set(media.media_type().as_str().to_string()),
        season: Set(to_i32(media.season())),
        episode: Set(to_i32(media.episode())),
        tmdb_id: Set(media
            .external_ids()
            .tmdb_id
            .and_then(|id| i64::try_from(id).ok())),
        imdb_id: Set(media.external_ids().imdb_id.clone()),
        images: Set(Some(JsonTransformer::encode(media.images())?)),
        primary_source_key: Set(media.primary_source_key().to_serialized_string()),
        created_at: Set(now),
        updated_at: Set(now),
    })
}

/// Rebuild the aggregate from its row and its variant rows.
///
/// The stored primary pointer is not trusted; it is recomputed from the
/// variants, so a row written by an older build cannot surface a stale primary.
pub fn canonical_media_from_models(
    model: CanonicalMediaModel,
    variants: Vec<MediaVariantModel>,
) -> CatalogResult<NormalizedMedia> {
    let mut variants = variants;
    variants.sort_by_key(|v| v.position);
    let variants = variants
        .into_iter()
        .map(MediaVariant::try_from)
        .collect::<CatalogResult<Vec<_>>>()?;

    let images = match model.images {
        Some(json) => JsonTransformer::decode(json)?,
        None => Default::default(),
    };

    let media = NormalizedMedia::new(
        GlobalId::parse(&model.global_id)?,
        model.title,
        model.media_type.parse()?,
        variants,
    )?
    .with_year(to_u32(model.year))
    .with_episode_numbers(to_u32(model.season), to_u32(model.episode))
    .with_external_ids(ExternalIds {
        tmdb_id: model.tmdb_id.and_then(|id| u64::try_from(id).ok()),
        imdb_id: model.imdb_id,
    })
    .with_images(images);

    Ok(media)
}

