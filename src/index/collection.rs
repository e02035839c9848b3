//! Primary collection with its secondary indexes

use crate::index::error::{IndexError, IndexResult};
use crate::index::indexer::{resolve_seq_id, Indexer};
use crate::index::secondary::Index;
use crate::record::{to_row, Record};
use crate::seqid::{SeqId, SeqIdGenerator};
use crate::store::ColumnStore;
use std::sync::Arc;

/// A record table and every index maintained for it
///
/// [`insert`](Collection::insert) is the write path: it assigns the SeqId
/// once, writes one entry per index and then the record itself.
pub struct Collection<R: Record> {
    store: Arc<dyn ColumnStore>,
    generator: Arc<SeqIdGenerator>,
    indexes: Vec<Index<R>>,
}

impl<R: Record> Collection<R> {
    /// Open the primary table, creating it on first use
    pub async fn open(
        store: Arc<dyn ColumnStore>,
        generator: Arc<SeqIdGenerator>,
    ) -> IndexResult<Self> {
        Indexer::Chronological.validate::<R>()?;
        store.create_table(&R::table_def()).await?;

        Ok(Self {
            store,
            generator,
            indexes: Vec::new(),
        })
    }

    /// Attach an index under its default name
    pub async fn add_index(&mut self, indexer: Indexer) -> IndexResult<&Index<R>> {
        let name = indexer.default_name();
        self.add_named_index(name, indexer).await
    }

    /// Attach an index under an explicit name
    pub async fn add_named_index(
        &mut self,
        name: impl Into<String>,
        indexer: Indexer,
    ) -> IndexResult<&Index<R>> {
        let name = name.into();
        if self.index(&name).is_some() {
            return Err(IndexError::Config(format!(
                "index {} already attached to {}",
                name,
                R::TABLE
            )));
        }

        let index = Index::open_named(
            Arc::clone(&self.store),
            Arc::clone(&self.generator),
            name,
            indexer,
        )
        .await?;
        self.indexes.push(index);

        let last = self.indexes.len() - 1;
        Ok(&self.indexes[last])
    }

    pub fn index(&self, name: &str) -> Option<&Index<R>> {
        self.indexes.iter().find(|index| index.name() == name)
    }

    pub fn indexes(&self) -> &[Index<R>] {
        &self.indexes
    }

    /// Store a record and index it everywhere
    ///
    /// A record without a SeqId gets one from the generator, written back
    /// into `record`. Every entry is computed before anything is written.
    pub async fn insert(&self, record: &mut R) -> IndexResult<SeqId> {
        let seq_id = resolve_seq_id(record, &self.generator)?;
        let row = to_row(record)?;

        let entries = self
            .indexes
            .iter()
            .map(|index| index.indexer().entry_from_row::<R>(&row, seq_id))
            .collect::<IndexResult<Vec<_>>>()?;

        for (index, entry) in self.indexes.iter().zip(&entries) {
            index.write_entry(entry).await?;
        }
        self.store.insert(R::TABLE, row).await?;

        tracing::debug!(table = R::TABLE, seq_id = %seq_id, indexes = entries.len(), "Inserted record");
        Ok(seq_id)
    }
}
