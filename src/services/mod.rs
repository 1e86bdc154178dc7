pub mod batching;
pub mod canonical_linker;
pub mod canonical_merge;
pub mod catalog;
pub mod enrichment;
pub mod runtime_guard;
pub mod variant_selector;

pub use batching::{
    BatchSizePolicy, BatchSizing, BatchWriter, ChunkSink, ChunkedWriteReport, DeviceClass,
    DeviceClassifier, HeuristicDeviceClassifier, StaticDeviceClassifier, SyncPhase,
    classifier_from_config,
};
pub use canonical_linker::{CanonicalLinker, LinkOutcome, PruneReport};
pub use canonical_merge::{
    CanonicalMergeEngine, LinkPolicy, NormalizedMediaEntry, StrongIdLinkPolicy,
};
pub use catalog::{
    CatalogEvent, CatalogEventStream, CatalogPipeline, PagedCatalogPipeline, ScanCheckpoint,
};
pub use enrichment::{EnrichmentService, MetadataResolver, ResolvedMetadata};
pub use runtime_guard::{GuardDecision, RuntimeConditions, RuntimeGuard, UnrestrictedConditions};
pub use variant_selector::{VariantSelector, VariantService};
