use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use super::SourceType;
use crate::utils::errors::ModelError;

macro_rules! impl_id_type {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_id_type!(GlobalId);
impl_id_type!(CategoryId);

const GLOBAL_ID_PREFIX: &str = "cm:";
const GLOBAL_ID_HEX_LEN: usize = 16;

impl GlobalId {
    /// Derive the stable canonical id for a canonical identity key.
    ///
    /// The id is a pure function of the key, so the same logical work maps to
    /// the same `cm:<16-hex>` id on every sync and on every device.
    pub fn from_canonical_key(canonical_key: &str) -> Self {
        let digest = Sha256::digest(canonical_key.as_bytes());
        let hex: String = digest[..GLOBAL_ID_HEX_LEN / 2]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        Self(format!("{}{}", GLOBAL_ID_PREFIX, hex))
    }

    /// Parse and validate a persisted global id.
    pub fn parse(value: &str) -> Result<Self, ModelError> {
        let hex = value
            .strip_prefix(GLOBAL_ID_PREFIX)
            .ok_or_else(|| ModelError::InvalidGlobalId(value.to_string()))?;
        let valid = hex.len() == GLOBAL_ID_HEX_LEN
            && hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if !valid {
            return Err(ModelError::InvalidGlobalId(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

/// Fast-dispatch tag naming the pipeline a source item came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineIdTag {
    Telegram,
    Xtream,
    Io,
    Plex,
    Audiobook,
    Other,
}

impl PipelineIdTag {
    pub const ALL: [PipelineIdTag; 6] = [
        PipelineIdTag::Telegram,
        PipelineIdTag::Xtream,
        PipelineIdTag::Io,
        PipelineIdTag::Plex,
        PipelineIdTag::Audiobook,
        PipelineIdTag::Other,
    ];

    /// Short stable code used as the prefix of a serialized [`SourceKey`].
    pub fn code(self) -> &'static str {
        match self {
            PipelineIdTag::Telegram => "tg",
            PipelineIdTag::Xtream => "xc",
            PipelineIdTag::Io => "io",
            PipelineIdTag::Plex => "plex",
            PipelineIdTag::Audiobook => "ab",
            PipelineIdTag::Other => "other",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, ModelError> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.code() == code)
            .ok_or_else(|| ModelError::UnknownPipeline(code.to_string()))
    }

    pub fn source_type(self) -> SourceType {
        match self {
            PipelineIdTag::Telegram => SourceType::Telegram,
            PipelineIdTag::Xtream => SourceType::Xtream,
            PipelineIdTag::Io => SourceType::Io,
            PipelineIdTag::Plex => SourceType::Plex,
            PipelineIdTag::Audiobook => SourceType::Audiobook,
            PipelineIdTag::Other => SourceType::Other,
        }
    }
}

impl From<SourceType> for PipelineIdTag {
    fn from(source_type: SourceType) -> Self {
        match source_type {
            SourceType::Telegram => PipelineIdTag::Telegram,
            SourceType::Xtream => PipelineIdTag::Xtream,
            SourceType::Io => PipelineIdTag::Io,
            SourceType::Plex => PipelineIdTag::Plex,
            SourceType::Audiobook => PipelineIdTag::Audiobook,
            SourceType::Other => PipelineIdTag::Other,
        }
    }
}

impl fmt::Display for PipelineIdTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Stable identity of one source's reference to one item.
///
/// Built once at the pipeline boundary and carried as a typed value; the
/// serialized form `"<pipeline code>:<source id>"` is only parsed when reading
/// persisted rows back. Source ids may contain `:` themselves (e.g.
/// `xtream:episode:12:1:3`), so parsing splits at the first separator only.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceKey {
    pipeline: PipelineIdTag,
    source_id: String,
}

impl SourceKey {
    pub fn new(pipeline: PipelineIdTag, source_id: impl Into<String>) -> Result<Self, ModelError> {
        let source_id = source_id.into();
        if source_id.trim().is_empty() {
            return Err(ModelError::InvalidSourceKey(format!(
                "{}: empty source id",
                pipeline.code()
            )));
        }
        Ok(Self {
            pipeline,
            source_id,
        })
    }

    pub fn pipeline(&self) -> PipelineIdTag {
        self.pipeline
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn to_serialized_string(&self) -> String {
        format!("{}:{}", self.pipeline.code(), self.source_id)
    }

    pub fn from_serialized_string(value: &str) -> Result<Self, ModelError> {
        let (code, source_id) = value
            .split_once(':')
            .ok_or_else(|| ModelError::InvalidSourceKey(value.to_string()))?;
        let pipeline = PipelineIdTag::from_code(code)?;
        Self::new(pipeline, source_id)
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pipeline.code(), self.source_id)
    }
}

impl FromStr for SourceKey {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_serialized_string(s)
    }
}

impl Serialize for SourceKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_serialized_string())
    }
}

impl<'de> Deserialize<'de> for SourceKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_serialized_string(&raw).map_err(serde::de::Error::custom)
    }
}
