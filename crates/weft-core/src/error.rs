//! Error types for Weft

use thiserror::Error;

use crate::ItemId;

/// Core Weft errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WeftError {
    // Encoding errors
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    // Pipeline errors
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Downstream channel closed")]
    ChannelClosed,

    // Model errors
    #[error("Unknown model type: {0}")]
    UnknownModelType(String),

    #[error("Model is read-only: {0}")]
    ReadOnlyModel(ItemId),

    #[error("Item already exists: {0}")]
    ItemExists(ItemId),

    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("Invalid mutation: {0}")]
    InvalidMutation(String),

    // Transport errors
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Result type for Weft operations
pub type WeftResult<T> = Result<T, WeftError>;
