//! Store error types
//!
//! Defines all errors that can occur in the column store layer.

use thiserror::Error;

/// Errors that can occur in a column store
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite operation failed
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Table was never created through this store
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Column is not part of the table definition
    #[error("Unknown column {column} in table {table}")]
    UnknownColumn { table: String, column: String },

    /// Row is missing a primary key column
    #[error("Missing key column {column} for table {table}")]
    MissingKey { table: String, column: String },

    /// Table or column name is not a plain identifier
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Existing table does not carry the defined columns
    #[error("Schema mismatch for table {table}: missing column {column}")]
    SchemaMismatch { table: String, column: String },

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),

    /// Blocking database task panicked or was cancelled
    #[error("Blocking task failed: {0}")]
    Task(String),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
