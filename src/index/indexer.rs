//! Indexing strategies
//!
//! An [`Indexer`] turns a record into the [`IndexEntry`] that points back at
//! it. Both strategies order entries by SeqId; they differ only in the
//! partition values that subdivide the index.

use crate::index::entry::{IndexEntry, RESERVED_COLUMNS};
use crate::index::error::{IndexError, IndexResult};
use crate::record::{to_row, Record};
use crate::seqid::{SeqId, SeqIdGenerator};
use crate::store::{validate_identifier, Row};
use std::collections::{BTreeMap, HashSet};

/// Name of the chronological index
pub const CHRONOLOGICAL_NAME: &str = "seq";

/// How records are partitioned inside an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indexer {
    /// Purely by time
    Chronological,
    /// By the values of these columns, then by time
    ByColumns(Vec<String>),
}

impl Indexer {
    /// Compound indexer over `columns`, in order
    pub fn by_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Indexer::ByColumns(columns.into_iter().map(Into::into).collect())
    }

    /// Indexed columns (empty for the chronological indexer)
    pub fn columns(&self) -> &[String] {
        match self {
            Indexer::Chronological => &[],
            Indexer::ByColumns(columns) => columns,
        }
    }

    /// `seq`, or `by_` followed by the column names joined with `_`
    pub fn default_name(&self) -> String {
        match self {
            Indexer::Chronological => CHRONOLOGICAL_NAME.to_string(),
            Indexer::ByColumns(columns) => format!("by_{}", columns.join("_")),
        }
    }

    /// Check the indexer against a record layout before touching the store
    pub fn validate<R: Record>(&self) -> IndexResult<()> {
        if R::KEY.is_empty() {
            return Err(IndexError::Config(format!(
                "record {} declares no key columns",
                R::TABLE
            )));
        }
        for key in R::KEY {
            if !R::COLUMNS.contains(key) {
                return Err(IndexError::Config(format!(
                    "key column {} is not a column of {}",
                    key,
                    R::TABLE
                )));
            }
            if RESERVED_COLUMNS.contains(key) {
                return Err(IndexError::Config(format!(
                    "key column {} clashes with a reserved index column",
                    key
                )));
            }
        }

        if let Indexer::ByColumns(columns) = self {
            if columns.is_empty() {
                return Err(IndexError::Config(
                    "compound index needs at least one column".to_string(),
                ));
            }
            let mut seen = HashSet::new();
            for column in columns {
                if !R::COLUMNS.contains(&column.as_str()) {
                    return Err(IndexError::Config(format!(
                        "indexed column {} is not a column of {}",
                        column,
                        R::TABLE
                    )));
                }
                if !seen.insert(column.as_str()) {
                    return Err(IndexError::Config(format!(
                        "column {} indexed twice",
                        column
                    )));
                }
            }
        }
        Ok(())
    }

    /// Compute the entry for `record`, assigning a SeqId if it has none
    pub fn compute_entry<R: Record>(
        &self,
        record: &mut R,
        generator: &SeqIdGenerator,
    ) -> IndexResult<IndexEntry> {
        let seq_id = resolve_seq_id(record, generator)?;
        let row = to_row(record)?;
        self.entry_from_row::<R>(&row, seq_id)
    }

    /// Build the entry from an already marshaled record
    pub fn entry_from_row<R: Record>(&self, row: &Row, seq_id: SeqId) -> IndexResult<IndexEntry> {
        let partition = self
            .columns()
            .iter()
            .map(|column| {
                row.get(column).cloned().ok_or_else(|| {
                    IndexError::Config(format!("record row lacks indexed column {}", column))
                })
            })
            .collect::<IndexResult<Vec<_>>>()?;

        Ok(IndexEntry::new(partition, seq_id, foreign_key::<R>(row)?))
    }
}

/// The record's SeqId, generating and writing one back when unset
pub fn resolve_seq_id<R: Record>(record: &mut R, generator: &SeqIdGenerator) -> IndexResult<SeqId> {
    match record.seq_id() {
        Some(id) => Ok(id),
        None => {
            let id = generator.next()?;
            record.set_seq_id(id);
            Ok(id)
        }
    }
}

/// Primary key columns of a marshaled record
fn foreign_key<R: Record>(row: &Row) -> IndexResult<BTreeMap<String, Vec<u8>>> {
    R::KEY
        .iter()
        .map(|&column| {
            row.get(column)
                .map(|value| (column.to_string(), value.clone()))
                .ok_or_else(|| {
                    IndexError::Config(format!("record row lacks key column {}", column))
                })
        })
        .collect()
}

/// Validate the identifier an index name turns into
pub(crate) fn validate_name(name: &str) -> IndexResult<()> {
    validate_identifier(name).map_err(|_| {
        IndexError::Config(format!(
            "index name {:?} must match [A-Za-z_][A-Za-z0-9_]*",
            name
        ))
    })
}
