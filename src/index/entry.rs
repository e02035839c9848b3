//! Index entry codec
//!
//! An index row carries three fixed columns plus the primary key columns of
//! the record it points at, copied under their own names:
//!
//! ```text
//! _partition | _interval | _seq_id       | seq_id (record key)
//! -----------+-----------+---------------+--------------------
//! 34:226f70  | 0a3kx     | 0a3kx9z0c41pq | "0a3kx9z0c41pq"
//! ```
//!
//! `_partition` joins the hex encoding of each partition value with `:`.
//! Hex digits never contain the separator, so any raw value (including one
//! holding `:`) splits back unambiguously. `(_partition, _interval)` is the
//! store partition and `_seq_id` the clustering column. The sentinel row has
//! an empty `_seq_id`, which sorts below every real id.

use crate::index::error::{IndexError, IndexResult};
use crate::seqid::{Interval, SeqId};
use crate::store::Row;
use std::collections::BTreeMap;

pub const PARTITION_COLUMN: &str = "_partition";
pub const INTERVAL_COLUMN: &str = "_interval";
pub const SEQ_ID_COLUMN: &str = "_seq_id";

/// Columns every backing table reserves for itself
pub const RESERVED_COLUMNS: [&str; 3] = [PARTITION_COLUMN, INTERVAL_COLUMN, SEQ_ID_COLUMN];

const PART_SEPARATOR: &str = ":";

/// One logical row of an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Raw (marshaled) partition values; empty for a chronological index
    pub partition: Vec<Vec<u8>>,
    pub interval: Interval,
    /// `None` marks the sentinel
    pub seq_id: Option<SeqId>,
    /// Primary key column → marshaled value
    pub foreign_key: BTreeMap<String, Vec<u8>>,
}

impl IndexEntry {
    /// Entry for a record committed with `seq_id`
    pub fn new(
        partition: Vec<Vec<u8>>,
        seq_id: SeqId,
        foreign_key: BTreeMap<String, Vec<u8>>,
    ) -> Self {
        Self {
            partition,
            interval: seq_id.interval(),
            seq_id: Some(seq_id),
            foreign_key,
        }
    }

    /// The "no older data" marker for `interval`
    pub fn sentinel(partition: Vec<Vec<u8>>, interval: Interval) -> Self {
        Self {
            partition,
            interval,
            seq_id: None,
            foreign_key: BTreeMap::new(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.seq_id.is_none()
    }

    /// Render as a backing-table row
    pub fn encode(&self) -> Row {
        let mut row: Row = self.foreign_key.clone();
        row.insert(PARTITION_COLUMN.to_string(), encode_partition(&self.partition));
        row.insert(
            INTERVAL_COLUMN.to_string(),
            self.interval.to_string().into_bytes(),
        );
        row.insert(
            SEQ_ID_COLUMN.to_string(),
            self.seq_id
                .map(|id| id.to_string().into_bytes())
                .unwrap_or_default(),
        );
        row
    }

    /// Parse a backing-table row
    ///
    /// A row without an interval belongs to no partition; its interval is
    /// recovered from the SeqId.
    pub fn decode(mut row: Row) -> IndexResult<Self> {
        let raw_seq = row.remove(SEQ_ID_COLUMN).unwrap_or_default();
        let seq_id = if raw_seq.is_empty() {
            None
        } else {
            Some(utf8(&raw_seq, SEQ_ID_COLUMN)?.parse::<SeqId>()?)
        };

        let raw_interval = row.remove(INTERVAL_COLUMN).unwrap_or_default();
        let raw_partition = row.remove(PARTITION_COLUMN).unwrap_or_default();

        let (partition, interval) = if raw_interval.is_empty() {
            let interval = seq_id.map(|id| id.interval()).ok_or_else(|| {
                IndexError::Encoding("sentinel row without interval".to_string())
            })?;
            (Vec::new(), interval)
        } else {
            let interval = utf8(&raw_interval, INTERVAL_COLUMN)?.parse::<Interval>()?;
            (decode_partition(&raw_partition)?, interval)
        };

        Ok(Self {
            partition,
            interval,
            seq_id,
            foreign_key: row,
        })
    }
}

/// Hex-encode each part and join with the separator
pub fn encode_partition(parts: &[Vec<u8>]) -> Vec<u8> {
    parts
        .iter()
        .map(hex::encode)
        .collect::<Vec<_>>()
        .join(PART_SEPARATOR)
        .into_bytes()
}

/// Inverse of [`encode_partition`]
pub fn decode_partition(raw: &[u8]) -> IndexResult<Vec<Vec<u8>>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    utf8(raw, PARTITION_COLUMN)?
        .split(PART_SEPARATOR)
        .map(|part| hex::decode(part).map_err(IndexError::from))
        .collect()
}

fn utf8<'a>(raw: &'a [u8], column: &str) -> IndexResult<&'a str> {
    std::str::from_utf8(raw)
        .map_err(|e| IndexError::Encoding(format!("column {} is not UTF-8: {}", column, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk(value: &str) -> BTreeMap<String, Vec<u8>> {
        let mut fk = BTreeMap::new();
        fk.insert("id".to_string(), value.as_bytes().to_vec());
        fk
    }

    #[test]
    fn test_encode_layout() {
        let id = SeqId::from_u64(1000);
        let entry = IndexEntry::new(vec![b"7".to_vec()], id, fk("\"a\""));
        let row = entry.encode();

        assert_eq!(row[PARTITION_COLUMN], b"37".to_vec());
        assert_eq!(row[INTERVAL_COLUMN], b"00000".to_vec());
        assert_eq!(row[SEQ_ID_COLUMN], b"00000000000rs".to_vec());
        assert_eq!(row["id"], b"\"a\"".to_vec());
    }

    #[test]
    fn test_separator_inside_values() {
        // Raw values containing the separator must survive the join
        let parts = vec![b"a:b".to_vec(), b"".to_vec(), b":".to_vec(), vec![0, 255]];
        let encoded = encode_partition(&parts);
        assert_eq!(encoded.iter().filter(|&&b| b == b':').count(), 3);
        assert_eq!(decode_partition(&encoded).unwrap(), parts);
    }

    #[test]
    fn test_decode_entry() {
        let id = SeqId::from_u64(123_456_789_000);
        let entry = IndexEntry::new(vec![b"1001".to_vec(), b"\"open\"".to_vec()], id, fk("x"));
        assert_eq!(IndexEntry::decode(entry.encode()).unwrap(), entry);
    }

    #[test]
    fn test_sentinel() {
        let sentinel = IndexEntry::sentinel(Vec::new(), Interval::from_u64(42));
        let row = sentinel.encode();
        assert!(row[SEQ_ID_COLUMN].is_empty());

        let back = IndexEntry::decode(row).unwrap();
        assert!(back.is_sentinel());
        assert_eq!(back.interval, Interval::from_u64(42));
    }

    #[test]
    fn test_missing_interval_means_no_partition() {
        let id = SeqId::from_u64(99_000_000_000_000);
        let mut row = fk("x");
        row.insert(SEQ_ID_COLUMN.to_string(), id.to_string().into_bytes());
        row.insert(PARTITION_COLUMN.to_string(), b"zz".to_vec());

        let entry = IndexEntry::decode(row).unwrap();
        assert!(entry.partition.is_empty());
        assert_eq!(entry.interval, id.interval());
        assert_eq!(entry.foreign_key, fk("x"));
    }

    #[test]
    fn test_malformed_rows() {
        let mut row = IndexEntry::new(vec![b"1".to_vec()], SeqId::from_u64(5), fk("x")).encode();
        row.insert(PARTITION_COLUMN.to_string(), b"3g".to_vec());
        assert!(matches!(
            IndexEntry::decode(row),
            Err(IndexError::Encoding(_))
        ));

        let mut row = IndexEntry::new(Vec::new(), SeqId::from_u64(5), fk("x")).encode();
        row.insert(INTERVAL_COLUMN.to_string(), b"!!".to_vec());
        assert!(matches!(
            IndexEntry::decode(row),
            Err(IndexError::Encoding(_))
        ));

        let mut row = IndexEntry::new(Vec::new(), SeqId::from_u64(5), fk("x")).encode();
        row.insert(SEQ_ID_COLUMN.to_string(), b"not an id".to_vec());
        assert!(IndexEntry::decode(row).is_err());
    }
}
