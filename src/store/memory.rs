//! In-memory column store
//!
//! Rows are kept per table in a BTreeMap keyed by the primary key values,
//! so every query sees the same ordering a SQLite BLOB column would give.
//! Useful for tests and for embedding without a database file.

use crate::store::{ColumnStore, Order, Row, Select, StoreError, StoreResult, TableDef};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Debug)]
struct MemTable {
    def: TableDef,
    /// primary key values → row
    rows: BTreeMap<Vec<Vec<u8>>, Row>,
}

/// Ordered-map implementation of [`ColumnStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, MemTable>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in a table (0 when the table does not exist)
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .map(|tables| tables.get(table).map(|t| t.rows.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    fn lock_error<E: std::fmt::Display>(e: E) -> StoreError {
        StoreError::Lock(format!("Failed to acquire table lock: {}", e))
    }
}

#[async_trait]
impl ColumnStore for MemoryStore {
    async fn create_table(&self, def: &TableDef) -> StoreResult<bool> {
        def.validate()?;

        let mut tables = self.tables.write().map_err(Self::lock_error)?;
        if let Some(existing) = tables.get(&def.name) {
            if let Some(missing) = def.columns.iter().find(|c| !existing.def.has_column(c)) {
                return Err(StoreError::SchemaMismatch {
                    table: def.name.clone(),
                    column: missing.clone(),
                });
            }
            return Ok(false);
        }

        tables.insert(
            def.name.clone(),
            MemTable {
                def: def.clone(),
                rows: BTreeMap::new(),
            },
        );
        Ok(true)
    }

    async fn insert(&self, table: &str, row: Row) -> StoreResult<()> {
        let mut tables = self.tables.write().map_err(Self::lock_error)?;
        let mem = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        mem.def.check_row(&row)?;

        let key: Vec<Vec<u8>> = mem
            .def
            .primary_key()
            .map(|column| row.get(column).cloned().unwrap_or_default())
            .collect();
        mem.rows.insert(key, row);

        Ok(())
    }

    async fn select(&self, query: &Select) -> StoreResult<Vec<Row>> {
        let tables = self.tables.read().map_err(Self::lock_error)?;
        let mem = tables
            .get(&query.table)
            .ok_or_else(|| StoreError::TableNotFound(query.table.clone()))?;
        mem.def.check_select(query)?;

        let mut rows: Vec<Row> = mem
            .rows
            .values()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();

        if let Some((column, order)) = &query.order_by {
            rows.sort_by(|a, b| a.get(column).cmp(&b.get(column)));
            if *order == Order::Desc {
                rows.reverse();
            }
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        Ok(rows)
    }
}
