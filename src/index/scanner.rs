//! Resumable reverse-chronological scans
//!
//! A scan walks one index partition from the newest interval towards the
//! oldest, page by page, and resolves every entry against the primary table.
//!
//! # Architecture
//!
//! ```text
//!   producer task                 resolver task               caller
//! ┌──────────────────┐  entries ┌──────────────────┐ records ┌─────────┐
//! │ SELECT ... seq < │ ───────► │ SELECT primary   │ ──────► │ next()  │
//! │ after DESC LIMIT │  mpsc(n) │ WHERE key = fk   │ mpsc(n) │         │
//! └──────────────────┘          └──────────────────┘         └─────────┘
//!          ▲                              ▲
//!          └───────── CancellationToken ──┘
//! ```
//!
//! Within an interval rows come back newest first. A short page means the
//! interval is drained and the producer steps to the previous one. Meeting
//! the sentinel, the lower bound or the limit ends the scan.

use crate::index::entry::{
    encode_partition, IndexEntry, INTERVAL_COLUMN, PARTITION_COLUMN, SEQ_ID_COLUMN,
};
use crate::index::error::{IndexError, IndexResult};
use crate::index::secondary::Index;
use crate::record::{from_row, marshal_value, Record};
use crate::seqid::{Interval, SeqId};
use crate::store::{ColumnStore, Order, Select};
use futures_util::stream::Stream;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Rows fetched per backing-table query unless configured otherwise
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Largest accepted page size (also the channel capacity)
pub const MAX_PAGE_SIZE: usize = 1_000_000;

/// Outcome of one [`Scanner::next`] call
#[derive(Debug)]
pub enum ScanStep<R> {
    /// The next record, newest first
    Record(R),
    /// No more records
    Exhausted,
    /// The scan failed; every later call returns the same error
    Failed(Arc<IndexError>),
}

impl<R> ScanStep<R> {
    pub fn into_record(self) -> Option<R> {
        match self {
            ScanStep::Record(record) => Some(record),
            _ => None,
        }
    }
}

/// Options for a scan over one index
pub struct ScanBuilder<R: Record> {
    index: Index<R>,
    after: Option<SeqId>,
    lower_bound: Option<Interval>,
    limit: Option<usize>,
    page_size: usize,
    partition: Vec<Vec<u8>>,
    deferred: Option<IndexError>,
}

impl<R: Record> ScanBuilder<R> {
    pub(crate) fn new(index: Index<R>) -> Self {
        let page_size = index.page_size();
        Self {
            index,
            after: None,
            lower_bound: None,
            limit: None,
            page_size,
            partition: Vec::new(),
            deferred: None,
        }
    }

    /// Only return records strictly older than `after`
    pub fn after(mut self, after: SeqId) -> Self {
        self.after = Some(after);
        self
    }

    /// Do not step below this interval
    pub fn lower_bound(mut self, interval: Interval) -> Self {
        self.lower_bound = Some(interval);
        self
    }

    /// Stop after this many index entries
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Add the value of the next indexed column, in index column order
    pub fn matching<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match marshal_value(value) {
            Ok(raw) => self.partition.push(raw),
            Err(e) => {
                if self.deferred.is_none() {
                    self.deferred = Some(e.into());
                }
            }
        }
        self
    }

    /// Validate the options and spawn the scan tasks
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> IndexResult<Scanner<R>> {
        if let Some(err) = self.deferred {
            return Err(err);
        }

        let expected = self.index.indexer().columns().len();
        if self.partition.len() != expected {
            return Err(IndexError::Config(format!(
                "index {} needs {} partition value(s), got {}",
                self.index.name(),
                expected,
                self.partition.len()
            )));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(IndexError::Config(format!(
                "page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }

        let (interval, after) = match self.after {
            Some(after) => (after.interval(), Some(after)),
            None => {
                let interval = self.index.generator().latest_interval()?;
                let after = interval.incr().and_then(Interval::first_seq_id);
                (interval, after)
            }
        };
        let lower = self
            .lower_bound
            .map_or(self.index.floor(), |bound| bound.max(self.index.floor()));

        let window = Window {
            table: self.index.backing_table().to_string(),
            partition: encode_partition(&self.partition),
            interval,
            after,
            lower,
            remaining: self.limit,
            page_size: self.page_size,
        };

        tracing::debug!(
            index = %self.index.name(),
            start = %interval,
            lower = %lower,
            limit = ?self.limit,
            "Starting scan"
        );

        let cancel = CancellationToken::new();
        let (entry_tx, entry_rx) = mpsc::channel(self.page_size);
        let (record_tx, record_rx) = mpsc::channel(self.page_size);

        let producer = tokio::spawn(produce(
            Arc::clone(self.index.store()),
            window,
            entry_tx,
            cancel.clone(),
        ));
        let resolver = tokio::spawn(resolve::<R>(
            Arc::clone(self.index.store()),
            entry_rx,
            record_tx,
            cancel.clone(),
        ));

        Ok(Scanner {
            records: record_rx,
            producer: Some(producer),
            resolver: Some(resolver),
            cancel,
            state: ScanState::Running,
            cursor: None,
            emitted: 0,
        })
    }
}

/// Producer progress through the index
struct Window {
    table: String,
    partition: Vec<u8>,
    interval: Interval,
    /// Exclusive upper bound; `None` only above the last representable id
    after: Option<SeqId>,
    lower: Interval,
    remaining: Option<usize>,
    page_size: usize,
}

impl Window {
    fn page_query(&self, want: usize) -> Select {
        let mut query = Select::from(self.table.as_str())
            .where_eq(PARTITION_COLUMN, self.partition.clone())
            .where_eq(INTERVAL_COLUMN, self.interval.to_string().into_bytes());
        if let Some(after) = self.after {
            query = query.where_lt(SEQ_ID_COLUMN, after.to_string().into_bytes());
        }
        query.order_by(SEQ_ID_COLUMN, Order::Desc).limit(want)
    }
}

/// Send `item`, giving up when the scan is cancelled or the receiver is gone
async fn forward<T>(tx: &mpsc::Sender<T>, item: T, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

async fn produce(
    store: Arc<dyn ColumnStore>,
    mut window: Window,
    entries: mpsc::Sender<IndexResult<IndexEntry>>,
    cancel: CancellationToken,
) {
    loop {
        let want = match window.remaining {
            Some(0) => return,
            Some(remaining) => remaining.min(window.page_size),
            None => window.page_size,
        };

        let query = window.page_query(want);
        let rows = tokio::select! {
            _ = cancel.cancelled() => return,
            rows = store.select(&query) => rows,
        };
        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                forward(&entries, Err(e.into()), &cancel).await;
                return;
            }
        };

        let fetched = rows.len();
        tracing::debug!(
            table = %window.table,
            interval = %window.interval,
            rows = fetched,
            "Fetched index page"
        );

        for row in rows {
            let entry = match IndexEntry::decode(row) {
                Ok(entry) => entry,
                Err(e) => {
                    forward(&entries, Err(e), &cancel).await;
                    return;
                }
            };

            // The sentinel: nothing older exists
            let Some(seq_id) = entry.seq_id else {
                return;
            };

            window.after = Some(seq_id);
            if let Some(remaining) = window.remaining.as_mut() {
                *remaining -= 1;
            }
            if !forward(&entries, Ok(entry), &cancel).await {
                return;
            }
        }

        if fetched < want {
            if window.interval <= window.lower {
                return;
            }
            match window.interval.decr() {
                Some(previous) => window.interval = previous,
                None => return,
            }
        }
    }
}

async fn resolve<R: Record>(
    store: Arc<dyn ColumnStore>,
    mut entries: mpsc::Receiver<IndexResult<IndexEntry>>,
    records: mpsc::Sender<IndexResult<(SeqId, R)>>,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => return,
            item = entries.recv() => item,
        };
        // Producer finished
        let Some(item) = item else {
            return;
        };

        match lookup::<R>(store.as_ref(), item, &cancel).await {
            Ok(Some(resolved)) => {
                if !forward(&records, Ok(resolved), &cancel).await {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                forward(&records, Err(e), &cancel).await;
                cancel.cancel();
                return;
            }
        }
    }
}

/// Fetch the primary record an entry points at; `None` when it is gone
async fn lookup<R: Record>(
    store: &dyn ColumnStore,
    item: IndexResult<IndexEntry>,
    cancel: &CancellationToken,
) -> IndexResult<Option<(SeqId, R)>> {
    let entry = item?;
    let seq_id = entry
        .seq_id
        .ok_or_else(|| IndexError::Encoding("sentinel passed to resolver".to_string()))?;
    if entry.foreign_key.is_empty() {
        return Err(IndexError::Encoding(format!(
            "index entry {} has no foreign key",
            seq_id
        )));
    }

    let query = entry
        .foreign_key
        .iter()
        .fold(Select::from(R::TABLE), |query, (column, value)| {
            query.where_eq(column.as_str(), value.clone())
        })
        .limit(1);

    let rows = tokio::select! {
        _ = cancel.cancelled() => return Ok(None),
        rows = store.select(&query) => rows?,
    };

    match rows.first() {
        Some(row) => Ok(Some((seq_id, from_row::<R>(row)?))),
        None => {
            tracing::warn!(
                table = R::TABLE,
                seq_id = %seq_id,
                "Index entry points at a missing record, skipping"
            );
            Ok(None)
        }
    }
}

#[derive(Debug)]
enum ScanState {
    Running,
    Exhausted,
    Failed(Arc<IndexError>),
}

/// A running scan
///
/// Pull records with [`next`](Scanner::next). Dropping the scanner cancels
/// its tasks.
pub struct Scanner<R: Record> {
    records: mpsc::Receiver<IndexResult<(SeqId, R)>>,
    producer: Option<JoinHandle<()>>,
    resolver: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    state: ScanState,
    cursor: Option<SeqId>,
    emitted: usize,
}

impl<R: Record> Scanner<R> {
    /// Next record, newest first
    pub async fn next(&mut self) -> ScanStep<R> {
        match &self.state {
            ScanState::Failed(err) => return ScanStep::Failed(Arc::clone(err)),
            ScanState::Exhausted => return ScanStep::Exhausted,
            ScanState::Running => {}
        }

        match self.records.recv().await {
            Some(Ok((seq_id, record))) => {
                self.cursor = Some(seq_id);
                self.emitted += 1;
                ScanStep::Record(record)
            }
            Some(Err(err)) => self.fail(err),
            None => match self.join().await {
                Ok(()) => {
                    self.state = ScanState::Exhausted;
                    ScanStep::Exhausted
                }
                Err(err) => self.fail(err),
            },
        }
    }

    /// SeqId of the last record returned; resume with `.after(cursor)`
    pub fn cursor(&self) -> Option<SeqId> {
        self.cursor
    }

    /// Number of records returned so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Stop the scan; later calls to `next` return `Exhausted`
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.records.close();
        if matches!(self.state, ScanState::Running) {
            self.state = ScanState::Exhausted;
        }
    }

    /// Drain the scan into a vector
    pub async fn collect_all(mut self) -> Result<Vec<R>, Arc<IndexError>> {
        let mut records = Vec::new();
        loop {
            match self.next().await {
                ScanStep::Record(record) => records.push(record),
                ScanStep::Exhausted => return Ok(records),
                ScanStep::Failed(err) => return Err(err),
            }
        }
    }

    /// Adapt into a stream that yields at most one error, then ends
    pub fn into_stream(self) -> impl Stream<Item = Result<R, Arc<IndexError>>> {
        futures_util::stream::unfold(Some(self), |scanner| async move {
            let mut scanner = scanner?;
            match scanner.next().await {
                ScanStep::Record(record) => Some((Ok(record), Some(scanner))),
                ScanStep::Failed(err) => Some((Err(err), None)),
                ScanStep::Exhausted => None,
            }
        })
    }

    fn fail(&mut self, err: IndexError) -> ScanStep<R> {
        tracing::error!("Scan failed after {} records: {}", self.emitted, err);
        self.cancel.cancel();
        let err = Arc::new(err);
        self.state = ScanState::Failed(Arc::clone(&err));
        ScanStep::Failed(err)
    }

    async fn join(&mut self) -> IndexResult<()> {
        for handle in [self.producer.take(), self.resolver.take()]
            .into_iter()
            .flatten()
        {
            handle
                .await
                .map_err(|e| IndexError::Pipeline(e.to_string()))?;
        }
        Ok(())
    }
}

impl<R: Record> Drop for Scanner<R> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<R: Record> std::fmt::Debug for Scanner<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("state", &self.state)
            .field("cursor", &self.cursor)
            .field("emitted", &self.emitted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Indexer;
    use crate::seqid::{SeqIdGenerator, EPOCH_MS};
    use crate::store::MemoryStore;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Login {
        seq_id: Option<SeqId>,
        user: String,
    }

    impl Record for Login {
        const TABLE: &'static str = "logins";
        const COLUMNS: &'static [&'static str] = &["seq_id", "user"];
        const KEY: &'static [&'static str] = &["seq_id"];

        fn seq_id(&self) -> Option<SeqId> {
            self.seq_id
        }

        fn set_seq_id(&mut self, id: SeqId) {
            self.seq_id = Some(id);
        }
    }

    async fn by_user() -> Index<Login> {
        let generator = SeqIdGenerator::with_clock(0, || EPOCH_MS + 5_000_000).unwrap();
        Index::open(
            Arc::new(MemoryStore::new()),
            Arc::new(generator),
            Indexer::by_columns(["user"]),
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_into_record() {
        assert_eq!(ScanStep::Record(5).into_record(), Some(5));
        assert_eq!(ScanStep::<i32>::Exhausted.into_record(), None);
    }

    #[tokio::test]
    async fn test_unmarshalable_partition_value() {
        let index = by_user().await;

        // JSON objects need string keys
        let mut bad = HashMap::new();
        bad.insert((1, 2), 3);

        let err = index.scan().matching(&bad).start().unwrap_err();
        assert!(matches!(err, IndexError::Marshal(_)));
    }

    #[tokio::test]
    async fn test_page_size_bounds() {
        let index = by_user().await;
        assert!(index.scan().matching("ann").page_size(MAX_PAGE_SIZE).start().is_ok());
        assert!(matches!(
            index.scan().matching("ann").page_size(MAX_PAGE_SIZE + 1).start(),
            Err(IndexError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unresolved_entries_yield_nothing() {
        let index = by_user().await.with_page_size(1);
        let floor = index.floor();
        let first = floor.first_seq_id().unwrap().as_u64();

        for offset in [3, 1, 2] {
            let mut login = Login {
                seq_id: Some(SeqId::from_u64(first + offset)),
                user: "ann".to_string(),
            };
            index.add(&mut login).await.unwrap();
        }

        // Entries exist but no primary rows: everything resolves to nothing
        let mut scanner = index
            .scan()
            .matching("ann")
            .after(SeqId::from_u64(first + 3))
            .start()
            .unwrap();
        assert!(matches!(scanner.next().await, ScanStep::Exhausted));
        assert_eq!(scanner.cursor(), None);
    }
}
