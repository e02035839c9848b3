//! Record mapping
//!
//! Application records are plain serde structs that declare their table
//! layout through the [`Record`] trait. Each column is marshaled to bytes
//! independently as JSON, so a SeqId column is stored as its padded
//! base-36 string.
//!
//! ```rust
//! use seqidx::record::Record;
//! use seqidx::seqid::SeqId;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Order {
//!     seq_id: Option<SeqId>,
//!     customer: String,
//!     total_cents: i64,
//! }
//!
//! impl Record for Order {
//!     const TABLE: &'static str = "orders";
//!     const COLUMNS: &'static [&'static str] = &["seq_id", "customer", "total_cents"];
//!     const KEY: &'static [&'static str] = &["seq_id"];
//!
//!     fn seq_id(&self) -> Option<SeqId> {
//!         self.seq_id
//!     }
//!
//!     fn set_seq_id(&mut self, id: SeqId) {
//!         self.seq_id = Some(id);
//!     }
//! }
//! ```

use crate::seqid::SeqId;
use crate::store::{Row, TableDef};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors converting between records and rows
#[derive(Error, Debug)]
pub enum MarshalError {
    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record did not serialize to a map of fields
    #[error("Record for table {0} is not a struct")]
    NotAStruct(&'static str),

    /// Declared column has no matching field
    #[error("Column {column} missing from record for table {table}")]
    MissingColumn { table: &'static str, column: String },
}

/// A strongly typed row of a primary collection
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table name
    const TABLE: &'static str;
    /// All stored columns, matching serde field names
    const COLUMNS: &'static [&'static str];
    /// Primary key columns, in key order
    const KEY: &'static [&'static str];

    /// The record's SeqId, if one was assigned
    fn seq_id(&self) -> Option<SeqId>;

    /// Store a freshly generated SeqId on the record
    fn set_seq_id(&mut self, id: SeqId);

    /// Table definition derived from the declared layout
    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE, Self::COLUMNS.iter().copied())
            .partition_key(Self::KEY.iter().copied())
    }
}

/// Marshal one value the way record columns are marshaled
pub fn marshal_value<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, MarshalError> {
    Ok(serde_json::to_vec(value)?)
}

/// Marshal a record into its declared columns
pub fn to_row<R: Record>(record: &R) -> Result<Row, MarshalError> {
    let mut fields = match serde_json::to_value(record)? {
        Value::Object(map) => map,
        _ => return Err(MarshalError::NotAStruct(R::TABLE)),
    };

    let mut row = Row::new();
    for &column in R::COLUMNS {
        let value = fields.remove(column).ok_or_else(|| MarshalError::MissingColumn {
            table: R::TABLE,
            column: column.to_string(),
        })?;
        row.insert(column.to_string(), serde_json::to_vec(&value)?);
    }
    Ok(row)
}

/// Rebuild a record from a row returned by the store
pub fn from_row<R: Record>(row: &Row) -> Result<R, MarshalError> {
    let mut fields = Map::new();
    for (column, bytes) in row {
        fields.insert(column.clone(), serde_json::from_slice(bytes)?);
    }
    Ok(serde_json::from_value(Value::Object(fields))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        seq_id: Option<SeqId>,
        sensor: String,
        value: i64,
    }

    impl Record for Reading {
        const TABLE: &'static str = "readings";
        const COLUMNS: &'static [&'static str] = &["seq_id", "sensor", "value"];
        const KEY: &'static [&'static str] = &["seq_id"];

        fn seq_id(&self) -> Option<SeqId> {
            self.seq_id
        }

        fn set_seq_id(&mut self, id: SeqId) {
            self.seq_id = Some(id);
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Misdeclared {
        sensor: String,
    }

    impl Record for Misdeclared {
        const TABLE: &'static str = "misdeclared";
        const COLUMNS: &'static [&'static str] = &["sensor", "value"];
        const KEY: &'static [&'static str] = &["sensor"];

        fn seq_id(&self) -> Option<SeqId> {
            None
        }

        fn set_seq_id(&mut self, _id: SeqId) {}
    }

    #[test]
    fn test_row_round_trip() {
        let reading = Reading {
            seq_id: Some(SeqId::from_u64(1000)),
            sensor: "boiler:2".to_string(),
            value: -4,
        };

        let row = to_row(&reading).unwrap();
        assert_eq!(row["seq_id"], b"\"00000000000rs\"".to_vec());
        assert_eq!(row["value"], b"-4".to_vec());

        let back: Reading = from_row(&row).unwrap();
        assert_eq!(back, reading);
    }

    #[test]
    fn test_marshal_value_matches_column() {
        let reading = Reading {
            seq_id: None,
            sensor: "boiler".to_string(),
            value: 1001,
        };
        let row = to_row(&reading).unwrap();
        assert_eq!(row["value"], marshal_value(&1001i64).unwrap());
        assert_eq!(row["sensor"], marshal_value("boiler").unwrap());
    }

    #[test]
    fn test_missing_column() {
        let record = Misdeclared {
            sensor: "x".to_string(),
        };
        assert!(matches!(
            to_row(&record),
            Err(MarshalError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_table_def() {
        let def = Reading::table_def();
        assert_eq!(def.name, "readings");
        assert_eq!(def.partition_key, vec!["seq_id".to_string()]);
        assert!(def.validate().is_ok());
    }
}
