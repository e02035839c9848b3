//! Interval buckets derived from SeqIds

use super::{decode, encode_padded, ParseIdError, SeqId, INTERVAL_SUFFIX, RADIX};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Width of a padded interval
pub const INTERVAL_WIDTH: usize = 5;

/// Number of SeqId values covered by one interval (36^8)
pub const INTERVAL_SPAN: u64 = (RADIX as u64).pow(INTERVAL_SUFFIX as u32);

const INTERVAL_MAX: u64 = (RADIX as u64).pow(INTERVAL_WIDTH as u32) - 1;

/// A coarse time bucket shared by all SeqIds with the same leading digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval(u64);

impl Interval {
    /// The numeric floor; nothing is older
    pub const FLOOR: Interval = Interval(0);

    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Next newer interval, `None` at the ceiling
    pub fn incr(self) -> Option<Interval> {
        (self.0 < INTERVAL_MAX).then(|| Interval(self.0 + 1))
    }

    /// Next older interval, `None` at the floor
    pub fn decr(self) -> Option<Interval> {
        self.0.checked_sub(1).map(Interval)
    }

    pub fn is_floor(&self) -> bool {
        self.0 == 0
    }

    /// Smallest SeqId inside this interval: the interval digits followed by zeros
    ///
    /// `None` when the interval lies beyond the u64 range of ids.
    pub fn first_seq_id(self) -> Option<SeqId> {
        self.0.checked_mul(INTERVAL_SPAN).map(SeqId::from_u64)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_padded(self.0, INTERVAL_WIDTH))
    }
}

impl FromStr for Interval {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s, INTERVAL_WIDTH)
            .map(Interval)
            .ok_or_else(|| ParseIdError::Interval(s.to_string()))
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
