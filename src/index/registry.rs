//! Index registry
//!
//! One row per backing table, recording the column signature the index was
//! created with and its floor interval: the interval that was current when
//! the backing table and its sentinel were created. No entry can be older
//! than the floor, so scans stop there even in partitions that never got a
//! sentinel of their own.

use crate::index::error::{IndexError, IndexResult};
use crate::seqid::Interval;
use crate::store::{ColumnStore, Row, Select, TableDef};
use std::sync::Arc;

pub const REGISTRY_TABLE: &str = "seqidx_indexes";

const TABLE_COLUMN: &str = "backing_table";
const COLUMNS_COLUMN: &str = "columns";
const FLOOR_COLUMN: &str = "floor";

/// What the registry knows about one index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub backing_table: String,
    pub columns: Vec<String>,
    pub floor: Interval,
}

impl Registration {
    fn encode(&self) -> IndexResult<Row> {
        let mut row = Row::new();
        row.insert(
            TABLE_COLUMN.to_string(),
            self.backing_table.as_bytes().to_vec(),
        );
        row.insert(
            COLUMNS_COLUMN.to_string(),
            serde_json::to_vec(&self.columns).map_err(crate::record::MarshalError::from)?,
        );
        row.insert(
            FLOOR_COLUMN.to_string(),
            self.floor.to_string().into_bytes(),
        );
        Ok(row)
    }

    fn decode(row: &Row) -> IndexResult<Self> {
        let field = |column: &str| {
            row.get(column).ok_or_else(|| {
                IndexError::Encoding(format!("registry row lacks column {}", column))
            })
        };

        let backing_table = String::from_utf8(field(TABLE_COLUMN)?.clone())
            .map_err(|e| IndexError::Encoding(format!("registry table name: {}", e)))?;
        let columns: Vec<String> = serde_json::from_slice(field(COLUMNS_COLUMN)?)
            .map_err(crate::record::MarshalError::from)?;
        let floor = std::str::from_utf8(field(FLOOR_COLUMN)?)
            .map_err(|e| IndexError::Encoding(format!("registry floor: {}", e)))?
            .parse::<Interval>()?;

        Ok(Self {
            backing_table,
            columns,
            floor,
        })
    }
}

/// Handle on the registry table of one store
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn ColumnStore>,
}

impl Registry {
    /// Create the registry table if needed
    pub async fn open(store: Arc<dyn ColumnStore>) -> IndexResult<Self> {
        let def = TableDef::new(REGISTRY_TABLE, [TABLE_COLUMN, COLUMNS_COLUMN, FLOOR_COLUMN])
            .partition_key([TABLE_COLUMN]);
        store.create_table(&def).await?;
        Ok(Self { store })
    }

    /// Registration of `backing_table`, if any
    pub async fn lookup(&self, backing_table: &str) -> IndexResult<Option<Registration>> {
        let query = Select::from(REGISTRY_TABLE)
            .where_eq(TABLE_COLUMN, backing_table.as_bytes().to_vec())
            .limit(1);
        let rows = self.store.select(&query).await?;
        match rows.first() {
            Some(row) => Ok(Some(Registration::decode(row)?)),
            None => Ok(None),
        }
    }

    /// Fail when `backing_table` is registered with different columns
    pub fn check_signature(
        name: &str,
        existing: &Registration,
        requested: &[String],
    ) -> IndexResult<()> {
        if existing.columns != requested {
            return Err(IndexError::NameCollision {
                name: name.to_string(),
                registered: existing.columns.clone(),
                requested: requested.to_vec(),
            });
        }
        Ok(())
    }

    pub async fn register(&self, registration: &Registration) -> IndexResult<()> {
        self.store
            .insert(REGISTRY_TABLE, registration.encode()?)
            .await?;
        tracing::debug!(
            table = %registration.backing_table,
            floor = %registration.floor,
            "Registered index"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registration(columns: &[&str]) -> Registration {
        Registration {
            backing_table: "events_by_number".to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            floor: Interval::from_u64(31_337),
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let store: Arc<dyn ColumnStore> = Arc::new(MemoryStore::new());
        let registry = Registry::open(store.clone()).await.unwrap();

        assert!(registry.lookup("events_by_number").await.unwrap().is_none());

        let reg = registration(&["number"]);
        registry.register(&reg).await.unwrap();
        assert_eq!(
            registry.lookup("events_by_number").await.unwrap(),
            Some(reg)
        );

        // Reopening keeps existing rows
        let again = Registry::open(store).await.unwrap();
        assert!(again.lookup("events_by_number").await.unwrap().is_some());
    }

    #[test]
    fn test_signature_mismatch() {
        let existing = registration(&["number"]);
        assert!(Registry::check_signature("by_x", &existing, &["number".to_string()]).is_ok());

        let err = Registry::check_signature(
            "by_x",
            &existing,
            &["number".to_string(), "status".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, IndexError::NameCollision { .. }));
    }

    #[test]
    fn test_decode_rejects_bad_floor() {
        let mut row = registration(&[]).encode().unwrap();
        row.insert(FLOOR_COLUMN.to_string(), b"??".to_vec());
        assert!(matches!(
            Registration::decode(&row),
            Err(IndexError::Encoding(_))
        ));
    }
}
