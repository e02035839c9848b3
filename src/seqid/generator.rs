//! SeqId generator
//!
//! Snowflake-style layout: milliseconds since [`EPOCH_MS`], then the worker
//! id, then a per-millisecond sequence. Ids from one generator are unique
//! and never decrease, even if the wall clock steps backwards.

use super::{Interval, SeqId, SEQUENCE_BITS, TIMESTAMP_SHIFT, WORKER_BITS};
use chrono::Utc;
use std::sync::Mutex;
use thiserror::Error;

/// 2020-01-01T00:00:00Z in Unix milliseconds
pub const EPOCH_MS: i64 = 1_577_836_800_000;

/// Largest worker id that fits the layout
pub const MAX_WORKER_ID: u16 = (1 << WORKER_BITS) - 1;

const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;
const MAX_TICK: i64 = (1 << (64 - TIMESTAMP_SHIFT - 1)) - 1;

/// Errors that can occur while issuing ids
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    /// Worker id does not fit in the id layout
    #[error("Worker id {0} exceeds maximum of {MAX_WORKER_ID}")]
    InvalidWorker(u16),

    /// The clock reports a time before the id epoch
    #[error("Clock reads {0} ms, before the id epoch")]
    ClockBeforeEpoch(i64),

    /// The timestamp no longer fits in the id layout
    #[error("Timestamp overflow at tick {0}")]
    TimestampOverflow(i64),

    /// Generator state lock was poisoned
    #[error("Lock error: {0}")]
    Lock(String),
}

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

#[derive(Debug)]
struct GeneratorState {
    /// Tick of the last issued id (ms since epoch)
    last_tick: i64,
    /// Sequence of the last issued id within `last_tick`
    sequence: u64,
}

/// Issues monotonically non-decreasing [`SeqId`]s
pub struct SeqIdGenerator {
    worker_id: u16,
    clock: Clock,
    state: Mutex<GeneratorState>,
}

impl std::fmt::Debug for SeqIdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeqIdGenerator")
            .field("worker_id", &self.worker_id)
            .finish_non_exhaustive()
    }
}

impl SeqIdGenerator {
    /// Create a generator reading the system clock
    pub fn new(worker_id: u16) -> Result<Self, GenerateError> {
        Self::with_clock(worker_id, || Utc::now().timestamp_millis())
    }

    /// Create a generator with a custom millisecond clock
    pub fn with_clock(
        worker_id: u16,
        clock: impl Fn() -> i64 + Send + Sync + 'static,
    ) -> Result<Self, GenerateError> {
        if worker_id > MAX_WORKER_ID {
            return Err(GenerateError::InvalidWorker(worker_id));
        }

        Ok(Self {
            worker_id,
            clock: Box::new(clock),
            state: Mutex::new(GeneratorState {
                last_tick: -1,
                sequence: 0,
            }),
        })
    }

    pub fn worker_id(&self) -> u16 {
        self.worker_id
    }

    /// Issue the next id
    pub fn next(&self) -> Result<SeqId, GenerateError> {
        let tick = self.now_tick()?;

        let mut state = self
            .state
            .lock()
            .map_err(|e| GenerateError::Lock(e.to_string()))?;

        if tick > state.last_tick {
            state.last_tick = tick;
            state.sequence = 0;
        } else {
            // Same millisecond, or the clock went backwards: stay on the last tick
            state.sequence += 1;
            if state.sequence > MAX_SEQUENCE {
                state.last_tick += 1;
                state.sequence = 0;
            }
        }

        if state.last_tick > MAX_TICK {
            return Err(GenerateError::TimestampOverflow(state.last_tick));
        }

        Ok(SeqId::from_u64(
            ((state.last_tick as u64) << TIMESTAMP_SHIFT)
                | ((self.worker_id as u64) << SEQUENCE_BITS)
                | state.sequence,
        ))
    }

    /// Interval of the oldest id this generator can still issue
    ///
    /// Every id issued from now on falls into this interval or a newer one.
    pub fn current_interval(&self) -> Result<Interval, GenerateError> {
        let tick = self.observed_tick()?;
        Ok(SeqId::from_u64((tick as u64) << TIMESTAMP_SHIFT).interval())
    }

    /// Interval of the newest id this generator may have issued so far
    ///
    /// Any worker's id for the current millisecond falls into this interval
    /// or an older one, so a scan starting here misses nothing already written.
    pub fn latest_interval(&self) -> Result<Interval, GenerateError> {
        let tick = self.observed_tick()?;
        let newest = ((tick as u64) << TIMESTAMP_SHIFT) | ((1 << TIMESTAMP_SHIFT) - 1);
        Ok(SeqId::from_u64(newest).interval())
    }

    /// Later of the wall clock and the last issued tick
    fn observed_tick(&self) -> Result<i64, GenerateError> {
        let now = self.now_tick()?;
        let last = self
            .state
            .lock()
            .map_err(|e| GenerateError::Lock(e.to_string()))?
            .last_tick;

        let tick = now.max(last);
        if tick > MAX_TICK {
            return Err(GenerateError::TimestampOverflow(tick));
        }
        Ok(tick)
    }

    fn now_tick(&self) -> Result<i64, GenerateError> {
        let now = (self.clock)();
        let tick = now - EPOCH_MS;
        if tick < 0 {
            return Err(GenerateError::ClockBeforeEpoch(now));
        }
        Ok(tick)
    }
}
