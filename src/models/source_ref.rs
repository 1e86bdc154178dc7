use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{GlobalId, MediaType, NormalizedMediaMetadata, RawMediaMetadata, SourceKey, SourceType};
use crate::utils::errors::ModelError;

/// Linking status of one persisted source reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Persisted by the fast ingest path; waiting for the backlog worker.
    Backlog,
    /// Kept as its own logical work with no canonical id (LIVE, ambiguous).
    Singleton,
    Linked,
    /// Linking raised an error; skipped until the next sync re-ingests it.
    Failed,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Backlog => "backlog",
            LinkState::Singleton => "singleton",
            LinkState::Linked => "linked",
            LinkState::Failed => "failed",
        }
    }
}

impl FromStr for LinkState {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(LinkState::Backlog),
            "singleton" => Ok(LinkState::Singleton),
            "linked" => Ok(LinkState::Linked),
            "failed" => Ok(LinkState::Failed),
            other => Err(ModelError::unknown("link state", other)),
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw per-source reference, keyed by its [`SourceKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_key: SourceKey,
    pub source_type: SourceType,
    pub source_label: String,
    pub media_type: MediaType,
    pub original_title: String,
    pub canonical_title: String,
    pub link_state: LinkState,
    pub canonical_id: Option<GlobalId>,
    pub raw: RawMediaMetadata,
    pub updated_at: DateTime<Utc>,
}

impl SourceRef {
    fn build(
        raw: RawMediaMetadata,
        normalized: &NormalizedMediaMetadata,
        link_state: LinkState,
        canonical_id: Option<GlobalId>,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            source_key: raw.source_key()?,
            source_type: raw.source_type,
            source_label: raw.source_label.clone(),
            media_type: normalized.media_type,
            original_title: raw.original_title.clone(),
            canonical_title: normalized.canonical_title.clone(),
            link_state,
            canonical_id,
            raw,
            updated_at: Utc::now(),
        })
    }

    /// Reference written by the link-free fast path. LIVE items never enter
    /// the backlog since they are never linked.
    pub fn deferred(
        raw: RawMediaMetadata,
        normalized: &NormalizedMediaMetadata,
    ) -> Result<Self, ModelError> {
        let state = if normalized.media_type == MediaType::Live {
            LinkState::Singleton
        } else {
            LinkState::Backlog
        };
        Self::build(raw, normalized, state, None)
    }

    pub fn singleton(
        raw: RawMediaMetadata,
        normalized: &NormalizedMediaMetadata,
    ) -> Result<Self, ModelError> {
        Self::build(raw, normalized, LinkState::Singleton, None)
    }

    pub fn linked(
        raw: RawMediaMetadata,
        normalized: &NormalizedMediaMetadata,
        canonical_id: GlobalId,
    ) -> Result<Self, ModelError> {
        Self::build(raw, normalized, LinkState::Linked, Some(canonical_id))
    }

    pub fn is_linked(&self) -> bool {
        self.link_state == LinkState::Linked && self.canonical_id.is_some()
    }
}
