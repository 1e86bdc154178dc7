//! Conversions between database entities and catalog models

pub mod catalog_mapper;

pub use catalog_mapper::{
    DateTimeTransformer, JsonTransformer, canonical_media_from_models,
    canonical_media_to_active_model, source_ref_to_active_model, variant_to_active_model,
};
