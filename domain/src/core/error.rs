//! Domain error types

use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Model pool must not be empty")]
    EmptyPool,

    #[error("All models failed to respond")]
    AllModelsFailed,

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Invalid proposal from {model}: {reason}")]
    InvalidProposal { model: String, reason: String },

    #[error("Duplicate action id: {0}")]
    DuplicateAction(String),
}
