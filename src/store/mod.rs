//! Column store contract
//!
//! The indexing layer only needs a handful of primitives from the underlying
//! wide-column store:
//!
//! - **create_table**: idempotent schema creation that reports whether the
//!   table was new (used to insert an index's sentinel exactly once)
//! - **insert**: single-row upsert
//! - **select**: equality on partition columns, one exclusive upper bound on
//!   a clustering column, ordering and a limit
//!
//! ```text
//! SELECT * FROM t WHERE p = ? AND i = ? AND s < ? ORDER BY s DESC LIMIT n
//! ```
//!
//! Values are opaque bytes compared byte-lexicographically, which is the only
//! ordering a partition-sorted store guarantees.
//!
//! Two implementations ship with the crate: [`SqliteStore`] (file-backed or
//! in-memory SQLite, all columns BLOB) and [`MemoryStore`] (ordered maps).

pub mod error;
mod memory;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::collections::BTreeMap;

/// A row of named, marshaled column values
pub type Row = BTreeMap<String, Vec<u8>>;

/// Table schema: column names and the primary key split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<String>,
    /// Columns identifying a partition
    pub partition_key: Vec<String>,
    /// Columns ordering rows within a partition
    pub clustering_key: Vec<String>,
}

impl TableDef {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            partition_key: Vec::new(),
            clustering_key: Vec::new(),
        }
    }

    /// Builder: set partition key columns
    pub fn partition_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partition_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set clustering key columns
    pub fn clustering_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clustering_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Partition key followed by clustering key
    pub fn primary_key(&self) -> impl Iterator<Item = &str> {
        self.partition_key
            .iter()
            .chain(self.clustering_key.iter())
            .map(String::as_str)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Check identifiers and that every key column is a declared column
    pub fn validate(&self) -> StoreResult<()> {
        validate_identifier(&self.name)?;
        for column in &self.columns {
            validate_identifier(column)?;
        }
        if self.partition_key.is_empty() {
            return Err(StoreError::MissingKey {
                table: self.name.clone(),
                column: "<partition key>".to_string(),
            });
        }
        for column in self.primary_key() {
            if !self.has_column(column) {
                return Err(self.unknown_column(column));
            }
        }
        Ok(())
    }

    /// Check a row against this schema before writing it
    pub fn check_row(&self, row: &Row) -> StoreResult<()> {
        for column in row.keys() {
            if !self.has_column(column) {
                return Err(self.unknown_column(column));
            }
        }
        for column in self.primary_key() {
            if !row.contains_key(column) {
                return Err(StoreError::MissingKey {
                    table: self.name.clone(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Check that a query only names columns of this table
    pub fn check_select(&self, query: &Select) -> StoreResult<()> {
        let named = query
            .eq
            .iter()
            .map(|(c, _)| c)
            .chain(query.below.iter().map(|(c, _)| c))
            .chain(query.order_by.iter().map(|(c, _)| c));
        for column in named {
            if !self.has_column(column) {
                return Err(self.unknown_column(column));
            }
        }
        Ok(())
    }

    fn unknown_column(&self, column: &str) -> StoreError {
        StoreError::UnknownColumn {
            table: self.name.clone(),
            column: column.to_string(),
        }
    }
}

/// Accept `[A-Za-z_][A-Za-z0-9_]*`
pub fn validate_identifier(name: &str) -> StoreResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// A bounded range read against one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    pub table: String,
    /// Equality predicates, ANDed
    pub eq: Vec<(String, Vec<u8>)>,
    /// Exclusive upper bound: `column < value`
    pub below: Option<(String, Vec<u8>)>,
    pub order_by: Option<(String, Order)>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            eq: Vec::new(),
            below: None,
            order_by: None,
            limit: None,
        }
    }

    /// Builder: add `column = value`
    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.eq.push((column.into(), value.into()));
        self
    }

    /// Builder: set `column < value`
    pub fn where_lt(mut self, column: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.below = Some((column.into(), value.into()));
        self
    }

    /// Builder: order results
    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by = Some((column.into(), order));
        self
    }

    /// Builder: cap the number of rows
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a row satisfies the predicates (ordering and limit aside)
    pub fn matches(&self, row: &Row) -> bool {
        let eq_ok = self
            .eq
            .iter()
            .all(|(column, value)| row.get(column) == Some(value));

        let below_ok = match &self.below {
            Some((column, bound)) => row.get(column).map(|v| v < bound).unwrap_or(false),
            None => true,
        };

        eq_ok && below_ok
    }
}

/// The primitive operations a wide-column store offers the index layer
#[async_trait]
pub trait ColumnStore: Send + Sync {
    /// Create a table if it does not exist; `true` when it was created now
    async fn create_table(&self, def: &TableDef) -> StoreResult<bool>;

    /// Upsert a single row
    async fn insert(&self, table: &str, row: Row) -> StoreResult<()>;

    /// Run a bounded range read
    async fn select(&self, query: &Select) -> StoreResult<Vec<Row>>;
}
