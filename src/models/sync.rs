use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::SourceType;
use crate::utils::errors::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Initial or forced catalog scan; links are deferred to the backlog.
    Full,
    /// Delta scan; items are linked inline.
    Incremental,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
        }
    }
}

impl FromStr for SyncMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(SyncMode::Full),
            "incremental" => Ok(SyncMode::Incremental),
            other => Err(ModelError::unknown("sync mode", other)),
        }
    }
}

/// Observable per-source sync state.
///
/// `Failed` and `Cancelled` are terminal for one run only; the next manual or
/// scheduled trigger re-enters `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Running {
        mode: SyncMode,
        items_persisted: usize,
        pages_committed: u32,
    },
    Success {
        at: DateTime<Utc>,
        items_synced: usize,
    },
    Failed {
        reason: String,
        at: DateTime<Utc>,
    },
    Cancelled {
        at: DateTime<Utc>,
        items_synced: usize,
    },
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Running { .. } => "running",
            SyncStatus::Success { .. } => "success",
            SyncStatus::Failed { .. } => "failed",
            SyncStatus::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SyncStatus::Running { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::Success { .. } | SyncStatus::Failed { .. } | SyncStatus::Cancelled { .. }
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted per-source progress record, used to resume after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLedgerEntry {
    pub source_type: SourceType,
    /// One of the [`SyncStatus::as_str`] values.
    pub status: String,
    pub mode: Option<SyncMode>,
    /// Last page whose items were durably committed.
    pub checkpoint: Option<u32>,
    pub items_persisted: u64,
    pub backlog_pending: bool,
    pub backlog_estimate: u64,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SyncLedgerEntry {
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            status: SyncStatus::Idle.as_str().to_string(),
            mode: None,
            checkpoint: None,
            items_persisted: 0,
            backlog_pending: false,
            backlog_estimate: 0,
            last_error: None,
            started_at: None,
            completed_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn start(mut self, mode: SyncMode) -> Self {
        let now = Utc::now();
        self.status = "running".to_string();
        self.mode = Some(mode);
        if mode == SyncMode::Full {
            self.checkpoint = None;
            self.items_persisted = 0;
        }
        self.last_error = None;
        self.started_at = Some(now);
        self.completed_at = None;
        self.updated_at = now;
        self
    }

    pub fn finish(mut self, status: &SyncStatus) -> Self {
        let now = Utc::now();
        self.status = status.as_str().to_string();
        self.last_error = match status {
            SyncStatus::Failed { reason, .. } => Some(reason.clone()),
            _ => None,
        };
        // A successful scan leaves nothing to resume from.
        if matches!(status, SyncStatus::Success { .. }) {
            self.checkpoint = None;
        }
        self.completed_at = Some(now);
        self.updated_at = now;
        self
    }

    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}
