//! Validation Error Types

use thiserror::Error;

/// Errors while coercing a submission
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Field could not be parsed as the expected type
    #[error("{field} is not a valid {expected}: {value:?}")]
    InvalidFormat {
        field: &'static str,
        expected: &'static str,
        value: String,
    },

    /// Float field parsed to NaN or infinity
    #[error("{field} must be a finite number, got {value:?}")]
    NonFinite { field: &'static str, value: String },
}

impl ValidationError {
    /// Name of the offending field
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingField(field) => field,
            ValidationError::InvalidFormat { field, .. } => field,
            ValidationError::NonFinite { field, .. } => field,
        }
    }
}
