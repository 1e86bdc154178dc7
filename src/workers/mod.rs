/// Background sync components: per-source scheduling and backlog linking
pub mod backlog_worker;
pub mod sinks;
pub mod sync_scheduler;


// Re-export commonly used types
pub use backlog_worker::{BacklogReport, BacklogWorker};
pub use sinks::{LinkFailureMode, LinkTally, LinkingSink, SourceRefSink};
pub use sync_scheduler::{CatalogSyncScheduler, SchedulerOptions, SyncTrigger};
