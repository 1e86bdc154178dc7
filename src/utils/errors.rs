use thiserror::Error;

/// Errors raised while constructing or parsing catalog model values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("A normalized media record needs at least one variant")]
    EmptyVariants,

    #[error("Invalid source key: {0}")]
    InvalidSourceKey(String),

    #[error("Unknown pipeline code: {0}")]
    UnknownPipeline(String),

    #[error("Unknown {kind} value: {value}")]
    UnknownEnumValue { kind: &'static str, value: String },

    #[error("Invalid global id: {0}")]
    InvalidGlobalId(String),
}

impl ModelError {
    pub fn unknown(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownEnumValue {
            kind,
            value: value.into(),
        }
    }
}

/// Errors crossing the catalog engine boundary.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Canonical work not found: {0}")]
    WorkNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;
