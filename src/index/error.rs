//! Index error types
//!
//! Defines all error conditions of the write path and of scans.

use crate::record::MarshalError;
use crate::seqid::{GenerateError, ParseIdError};
use crate::store::StoreError;
use thiserror::Error;

/// Errors that can occur while indexing or scanning
#[derive(Error, Debug)]
pub enum IndexError {
    /// Invalid index or scan setup, detected before any I/O
    #[error("Configuration error: {0}")]
    Config(String),

    /// Index name already registered for a different column set
    #[error("Index {name} is registered for columns {registered:?}, not {requested:?}")]
    NameCollision {
        name: String,
        registered: Vec<String>,
        requested: Vec<String>,
    },

    /// SeqId generation failed
    #[error("SeqId generation failed: {0}")]
    Generate(#[from] GenerateError),

    /// Backing or primary store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Malformed index entry (bad hex, separator, interval or SeqId)
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Record could not be marshaled or unmarshaled
    #[error("Marshal error: {0}")]
    Marshal(#[from] MarshalError),

    /// A scan task stopped without reporting a result
    #[error("Scan pipeline failed: {0}")]
    Pipeline(String),
}

impl From<ParseIdError> for IndexError {
    fn from(err: ParseIdError) -> Self {
        IndexError::Encoding(err.to_string())
    }
}

impl From<hex::FromHexError> for IndexError {
    fn from(err: hex::FromHexError) -> Self {
        IndexError::Encoding(format!("invalid partition part: {}", err))
    }
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;
