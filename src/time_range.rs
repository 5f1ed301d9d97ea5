// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{Decode, DecodeError, Encode, EncodeError},
    Time,
};
use std::io::{Read, Write};

/// A time range in the format of [from, to] (inclusive on both sides)
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TimeRange(Time, Time);

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}<=>{}]", self.from(), self.to())
    }
}

impl TimeRange {
    /// Creates a new time range.
    ///
    /// # Panics
    ///
    /// Panics if `from > to`.
    #[must_use]
    pub fn new(from: Time, to: Time) -> Self {
        assert!(from <= to, "invalid time range [{from}<=>{to}]");
        Self(from, to)
    }

    /// Returns the lower bound.
    #[must_use]
    pub const fn from(&self) -> Time {
        self.0
    }

    /// Returns the upper bound.
    #[must_use]
    pub const fn to(&self) -> Time {
        self.1
    }

    /// Returns `true` if the time point falls within this range.
    #[must_use]
    pub fn contains(&self, t: Time) -> bool {
        t >= self.0 && t <= self.1
    }

    /// Returns `true` if the `other` overlaps at least partially with this range.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.1 >= other.0 && self.0 <= other.1
    }

    /// Returns `true` if the window [from, to] overlaps this range.
    #[must_use]
    pub fn overlaps_window(&self, from: Time, to: Time) -> bool {
        self.1 >= from && self.0 <= to
    }

    /// Intersects this range with the window [from, to].
    #[must_use]
    pub fn clip(&self, from: Time, to: Time) -> Option<(Time, Time)> {
        let lo = self.0.max(from);
        let hi = self.1.min(to);
        (lo <= hi).then_some((lo, hi))
    }

    /// Order-preserving key encoding (from, then to).
    #[must_use]
    pub fn to_key(&self) -> [u8; 16] {
        let mut key = [0; 16];
        key[..8].copy_from_slice(&self.0.to_key());
        key[8..].copy_from_slice(&self.1.to_key());
        key
    }

    /// Decodes a key produced by [`TimeRange::to_key`].
    pub fn from_key(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < 16 {
            return Err(DecodeError::InvalidLength(bytes.len()));
        }

        let from = Time::from_key(&bytes[..8])?;
        let to = Time::from_key(&bytes[8..])?;
        Ok(Self(from, to))
    }
}

impl Encode for TimeRange {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        self.0.encode_into(writer)?;
        self.1.encode_into(writer)?;
        Ok(())
    }
}

impl Decode for TimeRange {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let from = Time::decode_from(reader)?;
        let to = Time::decode_from(reader)?;
        Ok(Self(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn range(from: i64, to: i64) -> TimeRange {
        TimeRange::new(Time::new(from), Time::new(to))
    }

    #[test]
    fn time_range_contains() {
        let r = range(10, 20);
        assert!(r.contains(Time::new(10)));
        assert!(r.contains(Time::new(15)));
        assert!(r.contains(Time::new(20)));
        assert!(!r.contains(Time::new(9)));
        assert!(!r.contains(Time::new(21)));
    }

    #[test]
    fn time_range_overlap() {
        assert!(range(0, 10).overlaps(&range(10, 20)));
        assert!(range(0, 10).overlaps(&range(5, 7)));
        assert!(!range(0, 10).overlaps(&range(11, 20)));
        assert!(range(5, 7).overlaps_window(Time::new(7), Time::new(100)));
        assert!(!range(5, 7).overlaps_window(Time::new(8), Time::new(100)));
    }

    #[test]
    fn time_range_clip() {
        let r = range(10, 20);
        assert_eq!(
            Some((Time::new(12), Time::new(20))),
            r.clip(Time::new(12), Time::new(50))
        );
        assert_eq!(
            Some((Time::new(10), Time::new(20))),
            r.clip(Time::MIN, Time::MAX)
        );
        assert_eq!(None, r.clip(Time::new(21), Time::new(50)));
    }

    #[test]
    fn time_range_key_ordering() {
        let a = range(0, 10).to_key();
        let b = range(11, 20).to_key();
        assert!(a < b);
    }
}
