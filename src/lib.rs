//! # seqidx
//!
//! Time-bucketed secondary indexes over a wide-column store. Records are
//! ordered by generator-issued SeqIds and scanned newest first, one coarse
//! time interval at a time, so no index partition grows without bound.
//!
//! ## Modules
//!
//! - [`seqid`]: SeqId generation and interval buckets
//! - [`store`]: Column store contract with SQLite and in-memory backends
//! - [`record`]: Mapping typed records to stored rows
//! - [`index`]: Indexers, indexes, the write path and resumable scans
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use seqidx::index::{Collection, Indexer, ScanStep};
//! use seqidx::record::Record;
//! use seqidx::seqid::{SeqId, SeqIdGenerator};
//! use seqidx::store::SqliteStore;
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Event {
//!     seq_id: Option<SeqId>,
//!     number: i64,
//! }
//!
//! impl Record for Event {
//!     const TABLE: &'static str = "events";
//!     const COLUMNS: &'static [&'static str] = &["seq_id", "number"];
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
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open("events.db".as_ref())?);
//!     let generator = Arc::new(SeqIdGenerator::new(0)?);
//!
//!     let mut events = Collection::<Event>::open(store, generator).await?;
//!     events.add_index(Indexer::by_columns(["number"])).await?;
//!
//!     events.insert(&mut Event { seq_id: None, number: 1001 }).await?;
//!
//!     // Newest first, only number 1001
//!     if let Some(by_number) = events.index("by_number") {
//!         let mut scanner = by_number.scan().matching(&1001).limit(10).start()?;
//!         while let ScanStep::Record(event) = scanner.next().await {
//!             println!("{:?}", event);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod index;
pub mod record;
pub mod seqid;
pub mod store;

// Re-export top-level types for convenience
pub use seqid::{GenerateError, Interval, ParseIdError, SeqId, SeqIdGenerator};

pub use store::{
    ColumnStore, MemoryStore, Order, Row, Select, SqliteStore, StoreError, StoreResult, TableDef,
};

pub use record::{MarshalError, Record};

pub use index::{
    Collection, Index, IndexEntry, IndexError, IndexResult, Indexer, ScanBuilder, ScanStep,
    Scanner,
};

pub use config::{Config, ConfigError, IndexSettings, LoggingConfig, StoreConfig};
