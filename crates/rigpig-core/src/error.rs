//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur when building or validating records.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// A required text field was empty
    #[error("{field} must not be empty")]
    EmptyField { field: String },

    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
