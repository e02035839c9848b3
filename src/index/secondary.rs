//! Secondary index over one record type

use crate::index::entry::{
    IndexEntry, INTERVAL_COLUMN, PARTITION_COLUMN, RESERVED_COLUMNS, SEQ_ID_COLUMN,
};
use crate::index::error::{IndexError, IndexResult};
use crate::index::indexer::{validate_name, Indexer};
use crate::index::registry::{Registration, Registry};
use crate::index::scanner::{ScanBuilder, DEFAULT_PAGE_SIZE};
use crate::record::Record;
use crate::seqid::{Interval, SeqId, SeqIdGenerator};
use crate::store::{ColumnStore, TableDef};
use std::marker::PhantomData;
use std::sync::Arc;

/// An [`Indexer`] bound to its backing table
///
/// Entries live in `<record table>_<index name>`. Cloning is cheap; clones
/// share the store and generator.
pub struct Index<R: Record> {
    name: String,
    indexer: Indexer,
    backing: TableDef,
    floor: Interval,
    page_size: usize,
    store: Arc<dyn ColumnStore>,
    generator: Arc<SeqIdGenerator>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Clone for Index<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            indexer: self.indexer.clone(),
            backing: self.backing.clone(),
            floor: self.floor,
            page_size: self.page_size,
            store: Arc::clone(&self.store),
            generator: Arc::clone(&self.generator),
            _record: PhantomData,
        }
    }
}

impl<R: Record> std::fmt::Debug for Index<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("indexer", &self.indexer)
            .field("backing_table", &self.backing.name)
            .field("floor", &self.floor)
            .finish_non_exhaustive()
    }
}

impl<R: Record> Index<R> {
    /// Open (creating on first use) the index with its default name
    pub async fn open(
        store: Arc<dyn ColumnStore>,
        generator: Arc<SeqIdGenerator>,
        indexer: Indexer,
    ) -> IndexResult<Self> {
        let name = indexer.default_name();
        Self::open_named(store, generator, name, indexer).await
    }

    /// Open the index under an explicit name
    ///
    /// The first open registers the generator's current interval as the
    /// index floor; the backing table holds its sentinel at that interval.
    /// An open that failed part way is completed by the next one.
    pub async fn open_named(
        store: Arc<dyn ColumnStore>,
        generator: Arc<SeqIdGenerator>,
        name: impl Into<String>,
        indexer: Indexer,
    ) -> IndexResult<Self> {
        let name = name.into();
        indexer.validate::<R>()?;
        validate_name(&name)?;

        let backing_name = format!("{}_{}", R::TABLE, name);
        validate_name(&backing_name)?;
        let backing = backing_table_def::<R>(&backing_name);

        // Primary lookups need the record table to be known to the store
        store.create_table(&R::table_def()).await?;

        // Registration precedes the backing table; a partial open is
        // completed by the next one
        let registry = Registry::open(Arc::clone(&store)).await?;
        let floor = match registry.lookup(&backing_name).await? {
            Some(existing) => {
                Registry::check_signature(&name, &existing, indexer.columns())?;
                existing.floor
            }
            None => {
                let floor = generator.current_interval()?;
                registry
                    .register(&Registration {
                        backing_table: backing_name.clone(),
                        columns: indexer.columns().to_vec(),
                        floor,
                    })
                    .await?;
                floor
            }
        };

        let created = store.create_table(&backing).await?;

        // Same key on every open, so rewriting it is a no-op
        let sentinel = IndexEntry::sentinel(Vec::new(), floor);
        store.insert(&backing_name, sentinel.encode()).await?;
        if created {
            tracing::info!(
                index = %name,
                table = %backing_name,
                floor = %floor,
                "Created index and inserted sentinel"
            );
        }

        Ok(Self {
            name,
            indexer,
            backing,
            floor,
            page_size: DEFAULT_PAGE_SIZE,
            store,
            generator,
            _record: PhantomData,
        })
    }

    /// Default page size for scans built from this index
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn backing_table(&self) -> &str {
        &self.backing.name
    }

    /// Oldest interval that can hold entries of this index
    pub fn floor(&self) -> Interval {
        self.floor
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Compute the entry for `record`, assigning a SeqId if it has none
    pub fn entry_for(&self, record: &mut R) -> IndexResult<IndexEntry> {
        self.indexer.compute_entry(record, &self.generator)
    }

    /// Index a record; returns the SeqId it was indexed under
    ///
    /// Only the index entry is written; use a
    /// [`Collection`](crate::index::Collection) to store the record as well.
    pub async fn add(&self, record: &mut R) -> IndexResult<SeqId> {
        let entry = self.entry_for(record)?;
        self.write_entry(&entry).await?;
        entry
            .seq_id
            .ok_or_else(|| IndexError::Encoding("computed entry has no seq id".to_string()))
    }

    /// Insert a precomputed entry into the backing table
    pub async fn write_entry(&self, entry: &IndexEntry) -> IndexResult<()> {
        self.store.insert(&self.backing.name, entry.encode()).await?;
        Ok(())
    }

    /// Start building a scan, newest records first
    pub fn scan(&self) -> ScanBuilder<R> {
        ScanBuilder::new(self.clone())
    }

    pub(crate) fn store(&self) -> &Arc<dyn ColumnStore> {
        &self.store
    }

    pub(crate) fn generator(&self) -> &SeqIdGenerator {
        &self.generator
    }
}

fn backing_table_def<R: Record>(name: &str) -> TableDef {
    TableDef::new(
        name,
        RESERVED_COLUMNS
            .iter()
            .copied()
            .chain(R::KEY.iter().copied()),
    )
    .partition_key([PARTITION_COLUMN, INTERVAL_COLUMN])
    .clustering_key([SEQ_ID_COLUMN])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::registry::REGISTRY_TABLE;
    use crate::seqid::EPOCH_MS;
    use crate::store::{MemoryStore, Row, Select, StoreError, StoreResult};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Note {
        seq_id: Option<SeqId>,
        author: String,
    }

    impl Record for Note {
        const TABLE: &'static str = "notes";
        const COLUMNS: &'static [&'static str] = &["seq_id", "author"];
        const KEY: &'static [&'static str] = &["seq_id"];

        fn seq_id(&self) -> Option<SeqId> {
            self.seq_id
        }

        fn set_seq_id(&mut self, id: SeqId) {
            self.seq_id = Some(id);
        }
    }

    fn fixtures() -> (Arc<MemoryStore>, Arc<SeqIdGenerator>) {
        let generator = SeqIdGenerator::with_clock(0, || EPOCH_MS + 7 * 86_400_000).unwrap();
        (Arc::new(MemoryStore::new()), Arc::new(generator))
    }

    #[tokio::test]
    async fn test_open_inserts_one_sentinel() {
        let (store, generator) = fixtures();

        let index = Index::<Note>::open(store.clone(), generator.clone(), Indexer::Chronological)
            .await
            .unwrap();
        assert_eq!(index.name(), "seq");
        assert_eq!(index.backing_table(), "notes_seq");
        assert_eq!(index.floor(), generator.current_interval().unwrap());
        assert_eq!(store.row_count("notes_seq"), 1);
        assert_eq!(store.row_count(REGISTRY_TABLE), 1);

        // Reopening neither adds a sentinel nor moves the floor
        let again = Index::<Note>::open(store.clone(), generator, Indexer::Chronological)
            .await
            .unwrap();
        assert_eq!(again.floor(), index.floor());
        assert_eq!(store.row_count("notes_seq"), 1);

        let rows = store.select(&Select::from("notes_seq")).await.unwrap();
        let sentinel = IndexEntry::decode(rows[0].clone()).unwrap();
        assert!(sentinel.is_sentinel());
        assert_eq!(sentinel.interval, index.floor());
    }

    #[tokio::test]
    async fn test_add_writes_entry() {
        let (store, generator) = fixtures();
        let index = Index::<Note>::open(store.clone(), generator, Indexer::by_columns(["author"]))
            .await
            .unwrap();

        let mut note = Note {
            seq_id: None,
            author: "ada".to_string(),
        };
        let id = index.add(&mut note).await.unwrap();

        assert_eq!(note.seq_id, Some(id));
        assert_eq!(store.row_count("notes_by_author"), 2);
    }

    #[tokio::test]
    async fn test_name_collision() {
        let (store, generator) = fixtures();
        Index::<Note>::open_named(
            store.clone(),
            generator.clone(),
            "recent",
            Indexer::Chronological,
        )
        .await
        .unwrap();

        let err = Index::<Note>::open_named(store, generator, "recent", Indexer::by_columns(["author"]))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::NameCollision { .. }));
    }

    #[tokio::test]
    async fn test_invalid_configuration() {
        let (store, generator) = fixtures();

        let err = Index::<Note>::open(store.clone(), generator.clone(), Indexer::by_columns(["title"]))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Config(_)));

        let err = Index::<Note>::open_named(store.clone(), generator, "drop table", Indexer::Chronological)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Config(_)));

        // Nothing was created
        assert_eq!(store.row_count(REGISTRY_TABLE), 0);
    }

    #[tokio::test]
    async fn test_unregistered_table_adopted() {
        let (store, generator) = fixtures();
        store
            .create_table(&backing_table_def::<Note>("notes_seq"))
            .await
            .unwrap();

        let index = Index::<Note>::open(store.clone(), generator.clone(), Indexer::Chronological)
            .await
            .unwrap();
        assert_eq!(index.floor(), generator.current_interval().unwrap());
        assert_eq!(store.row_count(REGISTRY_TABLE), 1);
        assert_eq!(store.row_count("notes_seq"), 1);
    }

    /// Store that fails the first insert into one table
    struct FailOnce {
        inner: MemoryStore,
        table: &'static str,
        tripped: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ColumnStore for FailOnce {
        async fn create_table(&self, def: &TableDef) -> StoreResult<bool> {
            self.inner.create_table(def).await
        }

        async fn insert(&self, table: &str, row: Row) -> StoreResult<()> {
            if table == self.table && !self.tripped.swap(true, Ordering::SeqCst) {
                return Err(StoreError::Lock("transient".to_string()));
            }
            self.inner.insert(table, row).await
        }

        async fn select(&self, query: &Select) -> StoreResult<Vec<Row>> {
            self.inner.select(query).await
        }
    }

    async fn open_after_failure(table: &'static str) -> (Arc<FailOnce>, Index<Note>) {
        let (_, generator) = fixtures();
        let store = Arc::new(FailOnce {
            inner: MemoryStore::new(),
            table,
            tripped: AtomicBool::new(false),
        });

        let err = Index::<Note>::open(store.clone(), generator.clone(), Indexer::Chronological)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Store(_)));

        let index = Index::<Note>::open(store.clone(), generator, Indexer::Chronological)
            .await
            .unwrap();
        (store, index)
    }

    #[tokio::test]
    async fn test_open_retries_after_failed_registration() {
        let (store, index) = open_after_failure(REGISTRY_TABLE).await;
        assert_eq!(store.inner.row_count(REGISTRY_TABLE), 1);
        assert_eq!(store.inner.row_count("notes_seq"), 1);
        assert!(index.scan().start().unwrap().collect_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_retries_after_failed_sentinel() {
        let (store, index) = open_after_failure("notes_seq").await;
        assert_eq!(store.inner.row_count("notes_seq"), 1);

        let rows = store.inner.select(&Select::from("notes_seq")).await.unwrap();
        let sentinel = IndexEntry::decode(rows[0].clone()).unwrap();
        assert!(sentinel.is_sentinel());
        assert_eq!(sentinel.interval, index.floor());
    }
}
