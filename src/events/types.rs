use serde::{Deserialize, Serialize};

use crate::models::{GlobalId, SourceKey, SourceType, SyncMode};

/// Event published by the sync engine for status observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    pub id: String,
    pub event_type: SyncEventType,
    pub source_type: SourceType,
    pub payload: SyncEventPayload,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub priority: EventPriority,
}

impl SyncEvent {
    pub fn new(event_type: SyncEventType, source_type: SourceType, payload: SyncEventPayload) -> Self {
        let priority = match event_type {
            SyncEventType::SyncFailed => EventPriority::High,
            SyncEventType::SyncProgress | SyncEventType::WorkUpdated => EventPriority::Low,
            _ => EventPriority::Normal,
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            source_type,
            payload,
            timestamp: chrono::Utc::now(),
            priority,
        }
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SyncEventType {
    // Scan lifecycle
    SyncStarted,
    SyncProgress,
    SyncCompleted,
    SyncFailed,
    SyncCancelled,
    SyncDeferred,

    // Backlog lifecycle
    BacklogScheduled,
    BacklogCancelled,
    BacklogStarted,
    BacklogCompleted,

    // Canonical works
    WorkCreated,
    WorkUpdated,
    SourcePruned,
}

impl SyncEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncEventType::SyncStarted => "sync.started",
            SyncEventType::SyncProgress => "sync.progress",
            SyncEventType::SyncCompleted => "sync.completed",
            SyncEventType::SyncFailed => "sync.failed",
            SyncEventType::SyncCancelled => "sync.cancelled",
            SyncEventType::SyncDeferred => "sync.deferred",
            SyncEventType::BacklogScheduled => "backlog.scheduled",
            SyncEventType::BacklogCancelled => "backlog.cancelled",
            SyncEventType::BacklogStarted => "backlog.started",
            SyncEventType::BacklogCompleted => "backlog.completed",
            SyncEventType::WorkCreated => "work.created",
            SyncEventType::WorkUpdated => "work.updated",
            SyncEventType::SourcePruned => "source.pruned",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SyncEventPayload {
    Sync {
        mode: SyncMode,
        items_synced: usize,
        pages_committed: u32,
        error: Option<String>,
    },
    Deferred {
        reason: String,
    },
    Backlog {
        estimated_items: u64,
        processed: usize,
        linked: usize,
        failed: usize,
    },
    Work {
        global_id: GlobalId,
        source_key: SourceKey,
    },
    Prune {
        works_updated: usize,
        works_deleted: usize,
        refs_deleted: u64,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    Low = 0,
    Normal = 1,
    High = 2,
}
