//! SQLite-backed column store
//!
//! Every column is declared BLOB, so comparisons in `WHERE col < ?` and
//! `ORDER BY` are plain memcmp: the same byte-lexicographic ordering a
//! partition-sorted store gives within a partition.
//!
//! Inserts use `INSERT OR REPLACE`, matching upsert semantics.
//!
//! Row reads and writes run on tokio's blocking pool so a long page query
//! does not stall the runtime worker driving a scan.

use crate::store::{
    validate_identifier, ColumnStore, Order, Row, Select, StoreError, StoreResult, TableDef,
};
use async_trait::async_trait;
use rusqlite::{params_from_iter, Connection, OpenFlags, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tokio::task;

/// SQLite implementation of [`ColumnStore`]
pub struct SqliteStore {
    /// std::sync::Mutex because rusqlite's Connection is !Sync
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
    /// Definitions of tables created through this handle
    tables: RwLock<HashMap<String, TableDef>>,
}

impl SqliteStore {
    /// Create or open a database file
    pub fn open(path: &Path) -> StoreResult<Self> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        // Configure for performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = 10000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        tracing::debug!(path = %path.display(), "Opened SQLite store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
            tables: RwLock::new(HashMap::new()),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
            tables: RwLock::new(HashMap::new()),
        })
    }

    /// Database file path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Force checkpoint for WAL mode
    pub fn checkpoint(&self) -> StoreResult<()> {
        self.lock()?
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        lock_conn(&self.conn)
    }

    /// Run `f` against the connection on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    fn table(&self, name: &str) -> StoreResult<TableDef> {
        let tables = self
            .tables
            .read()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire table lock: {}", e)))?;
        tables
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    fn remember(&self, def: &TableDef) -> StoreResult<()> {
        self.tables
            .write()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire table lock: {}", e)))?
            .insert(def.name.clone(), def.clone());
        Ok(())
    }
}

fn lock_conn(conn: &Mutex<Connection>) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| StoreError::Lock(format!("Failed to acquire connection lock: {}", e)))
}

/// Quote an identifier that already passed [`validate_identifier`]
fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

fn create_table_sql(def: &TableDef) -> String {
    let columns: Vec<String> = def
        .columns
        .iter()
        .map(|c| format!("{} BLOB", quote(c)))
        .collect();
    let key: Vec<String> = def.primary_key().map(quote).collect();

    format!(
        "CREATE TABLE {} ({}, PRIMARY KEY ({}))",
        quote(&def.name),
        columns.join(", "),
        key.join(", ")
    )
}

fn select_sql(def: &TableDef, query: &Select) -> (String, Vec<Vec<u8>>) {
    let columns: Vec<String> = def.columns.iter().map(|c| quote(c)).collect();
    let mut sql = format!("SELECT {} FROM {}", columns.join(", "), quote(&def.name));
    let mut params = Vec::new();

    let mut predicates = Vec::new();
    for (column, value) in &query.eq {
        predicates.push(format!("{} = ?", quote(column)));
        params.push(value.clone());
    }
    if let Some((column, value)) = &query.below {
        predicates.push(format!("{} < ?", quote(column)));
        params.push(value.clone());
    }
    if !predicates.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }

    if let Some((column, order)) = &query.order_by {
        let direction = match order {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        };
        sql.push_str(&format!(" ORDER BY {} {}", quote(column), direction));
    }

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    (sql, params)
}

#[async_trait]
impl ColumnStore for SqliteStore {
    async fn create_table(&self, def: &TableDef) -> StoreResult<bool> {
        def.validate()?;

        let created = {
            let conn = self.lock()?;

            let exists: Option<String> = conn
                .query_row(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
                    [def.name.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            if exists.is_some() {
                let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(&def.name)))?;
                let existing: Vec<String> = stmt
                    .query_map([], |row| row.get::<_, String>(1))?
                    .collect::<Result<_, _>>()?;

                if let Some(missing) = def.columns.iter().find(|c| !existing.contains(c)) {
                    return Err(StoreError::SchemaMismatch {
                        table: def.name.clone(),
                        column: missing.clone(),
                    });
                }
                false
            } else {
                conn.execute(&create_table_sql(def), [])?;
                true
            }
        };

        self.remember(def)?;

        if created {
            tracing::info!(table = %def.name, "Created table");
        }
        Ok(created)
    }

    async fn insert(&self, table: &str, row: Row) -> StoreResult<()> {
        let def = self.table(table)?;
        def.check_row(&row)?;

        let columns: Vec<String> = row.keys().map(|c| quote(c)).collect();
        let placeholders = vec!["?"; row.len()].join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            quote(table),
            columns.join(", "),
            placeholders
        );

        self.blocking(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            stmt.execute(params_from_iter(row.values()))?;
            Ok(())
        })
        .await
    }

    async fn select(&self, query: &Select) -> StoreResult<Vec<Row>> {
        validate_identifier(&query.table)?;
        let def = self.table(&query.table)?;
        def.check_select(query)?;

        let (sql, params) = select_sql(&def, query);

        self.blocking(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params_from_iter(params.iter()), |sql_row| {
                let mut row = Row::new();
                for (idx, column) in def.columns.iter().enumerate() {
                    if let Some(value) = sql_row.get::<_, Option<Vec<u8>>>(idx)? {
                        row.insert(column.clone(), value);
                    }
                }
                Ok(row)
            })?;

            let rows = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}
