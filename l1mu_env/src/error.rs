//! Error types for the event input layer.

use thiserror::Error;

/// Errors that can occur while retrieving or reading event data.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A requested collection is not present in the event
    #[error("Missing product: {0}")]
    MissingProduct(String),

    /// A collection violates its own shape (BX range vs. buckets)
    #[error("Invalid collection: {0}")]
    InvalidCollection(String),

    /// Underlying file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialized event could not be decoded
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl EnvError {
    /// Creates a missing-product error for the given label.
    pub fn missing(label: impl std::fmt::Display) -> Self {
        Self::MissingProduct(label.to_string())
    }

    /// Creates an invalid-collection error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidCollection(msg.into())
    }

    /// Returns true if this error means "not available" rather than a broken input.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::MissingProduct(_))
    }
}
