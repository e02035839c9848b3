//! Sequence identifiers and interval buckets
//!
//! A [`SeqId`] is a 64-bit identifier laid out (high to low) as
//! 41 bits of milliseconds since [`EPOCH_MS`], 10 bits of worker id and
//! 12 bits of intra-tick sequence. It is stored as a base-36 string,
//! zero-padded to [`SEQ_ID_WIDTH`] digits so that byte order and numeric
//! order agree.
//!
//! An [`Interval`] is the padded form with the low [`INTERVAL_SUFFIX`]
//! digits dropped. All ids issued within roughly eleven minutes share one
//! interval, which is what bounds the size of an index partition.
//!
//! ```text
//! SeqId:    0a3kx 9z0c41pq
//!           ^^^^^ ^^^^^^^^
//!           interval   dropped suffix
//! ```

mod generator;
mod interval;

pub use generator::{GenerateError, SeqIdGenerator, EPOCH_MS, MAX_WORKER_ID};
pub use interval::{Interval, INTERVAL_SPAN, INTERVAL_WIDTH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Radix of the textual rendering
pub const RADIX: u32 = 36;

/// Width of a padded SeqId (u64::MAX needs 13 base-36 digits)
pub const SEQ_ID_WIDTH: usize = 13;

/// Number of low-order digits dropped to form an interval
pub const INTERVAL_SUFFIX: usize = SEQ_ID_WIDTH - INTERVAL_WIDTH;

pub(crate) const WORKER_BITS: u32 = 10;
pub(crate) const SEQUENCE_BITS: u32 = 12;
pub(crate) const TIMESTAMP_SHIFT: u32 = WORKER_BITS + SEQUENCE_BITS;

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Errors from parsing the textual form of ids and intervals
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseIdError {
    #[error("invalid seq id: {0:?}")]
    SeqId(String),

    #[error("invalid interval: {0:?}")]
    Interval(String),
}

/// Time-ordered identifier issued by a [`SeqIdGenerator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqId(u64);

impl SeqId {
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The interval bucket this id falls into
    pub fn interval(&self) -> Interval {
        Interval::from_u64(self.0 / INTERVAL_SPAN)
    }

    /// Wall-clock milliseconds encoded in the high bits
    pub fn timestamp_ms(&self) -> i64 {
        EPOCH_MS + (self.0 >> TIMESTAMP_SHIFT) as i64
    }

    pub fn worker_id(&self) -> u16 {
        ((self.0 >> SEQUENCE_BITS) & ((1 << WORKER_BITS) - 1)) as u16
    }

    pub fn sequence(&self) -> u16 {
        (self.0 & ((1 << SEQUENCE_BITS) - 1)) as u16
    }
}

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_padded(self.0, SEQ_ID_WIDTH))
    }
}

impl FromStr for SeqId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s, SEQ_ID_WIDTH)
            .map(SeqId)
            .ok_or_else(|| ParseIdError::SeqId(s.to_string()))
    }
}

impl Serialize for SeqId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SeqId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Render `value` in base 36, left-padded with zeros to `width`
pub(crate) fn encode_padded(mut value: u64, width: usize) -> String {
    let mut buf = Vec::with_capacity(width);
    loop {
        buf.push(DIGITS[(value % RADIX as u64) as usize]);
        value /= RADIX as u64;
        if value == 0 {
            break;
        }
    }
    while buf.len() < width {
        buf.push(b'0');
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

/// Parse exactly `width` lowercase base-36 digits
///
/// Only the padded form written by [`encode_padded`] is accepted, so a
/// parsed value always renders back to the same bytes.
pub(crate) fn decode(s: &str, width: usize) -> Option<u64> {
    if s.len() != width || !s.bytes().all(|b| DIGITS.contains(&b)) {
        return None;
    }
    u64::from_str_radix(s, RADIX).ok()
}
