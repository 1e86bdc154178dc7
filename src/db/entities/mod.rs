pub mod canonical_media;
pub mod media_variants;
pub mod source_refs;
pub mod sync_ledger;

// Re-export entities for convenience
pub use canonical_media::{
    ActiveModel as CanonicalMediaActiveModel, Entity as CanonicalMedia,
    Model as CanonicalMediaModel,
};
pub use media_variants::{
    ActiveModel as MediaVariantActiveModel, Entity as MediaVariantEntity,
    Model as MediaVariantModel,
};
pub use source_refs::{
    ActiveModel as SourceRefActiveModel, Entity as SourceRefEntity, Model as SourceRefModel,
};
pub use sync_ledger::{
    ActiveModel as SyncLedgerActiveModel, Entity as SyncLedger, Model as SyncLedgerModel,
};
