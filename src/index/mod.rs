//! Time-bucketed secondary indexes
//!
//! Every index is a separate table whose partitions are `(values, interval)`
//! and whose rows are ordered by SeqId inside a partition:
//!
//! - **Indexer**: derives partition values and the SeqId from a record
//! - **Index**: owns the backing table, its sentinel and floor interval
//! - **Scanner**: walks intervals newest to oldest and resolves records
//! - **Collection**: writes a record and all of its index entries
//!
//! # Architecture
//!
//! ```text
//! insert(record)
//!        ↓
//! Indexer: (values, SeqId) → entry in <table>_<index>
//!        ↓
//! Primary row in <table>
//!
//! scan(values)
//!        ↓
//! interval N, N-1, ... floor  (stop at sentinel, limit or lower bound)
//!        ↓
//! foreign key → primary row → record
//! ```

mod collection;
pub mod entry;
mod error;
mod indexer;
mod registry;
mod scanner;
mod secondary;

pub use collection::Collection;
pub use entry::IndexEntry;
pub use error::{IndexError, IndexResult};
pub use indexer::{resolve_seq_id, Indexer, CHRONOLOGICAL_NAME};
pub use registry::{Registration, Registry, REGISTRY_TABLE};
pub use scanner::{ScanBuilder, ScanStep, Scanner, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use secondary::Index;
