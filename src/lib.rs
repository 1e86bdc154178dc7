//! Cross-source media catalog: normalization, canonical linking, variant
//! selection and device-aware background sync.

#![allow(clippy::result_large_err)]

pub mod config;
pub mod db;
pub mod events;
pub mod mapper;
pub mod models;
pub mod normalizer;
pub mod services;
pub mod utils;
pub mod workers;

pub use config::Config;
pub use db::{CatalogStore, Database, SqliteCatalogStore};
pub use events::EventBus;
pub use services::{BatchSizing, CanonicalLinker, CanonicalMergeEngine, VariantService};
pub use workers::{CatalogSyncScheduler, SchedulerOptions, SyncTrigger};
