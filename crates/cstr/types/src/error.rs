use thiserror::Error;

/// Errors raised while building observations and actions at the boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypesError {
    #[error("schema mismatch: expected {expected} channels, found {found}")]
    SchemaMismatch { expected: usize, found: usize },

    #[error("schema mismatch: missing channel {0}")]
    MissingChannel(&'static str),

    #[error("conversion error on {channel}: {value} is not a number")]
    Conversion { channel: String, value: String },

    #[error("non-finite value on {channel}")]
    NonFinite { channel: String },

    #[error("invalid action: {0}")]
    InvalidAction(String),
}

impl TypesError {
    /// Whether the error is a channel count or channel name mismatch.
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(
            self,
            TypesError::SchemaMismatch { .. } | TypesError::MissingChannel(_)
        )
    }
}

/// Result type for boundary conversions.
pub type TypesResult<T> = Result<T, TypesError>;
