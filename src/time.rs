// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// A point on the monotonic series time line
///
/// The unit of a tick is up to the user (milliseconds, nanoseconds,
/// trade counter, ...); the engine only relies on ordering and on
/// stepping by one tick.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Time(i64);

impl Time {
    /// Smallest representable time point.
    pub const MIN: Self = Self(i64::MIN);

    /// Largest representable time point.
    pub const MAX: Self = Self(i64::MAX);

    /// Creates a time point from raw ticks.
    #[must_use]
    pub const fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Returns the raw tick value.
    #[must_use]
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Next time point (saturating).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Previous time point (saturating).
    #[must_use]
    pub const fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    /// Order-preserving big-endian key encoding.
    ///
    /// Flipping the sign bit maps the signed tick space onto an unsigned
    /// space with the same ordering, so encoded keys compare bytewise.
    #[must_use]
    pub fn to_key(self) -> [u8; 8] {
        ((self.0 as u64) ^ (1 << 63)).to_be_bytes()
    }

    /// Decodes a key produced by [`Time::to_key`].
    pub fn from_key(bytes: &[u8]) -> Result<Self, DecodeError> {
        let arr: [u8; 8] = bytes
            .get(..8)
            .and_then(|b| b.try_into().ok())
            .ok_or(DecodeError::InvalidLength(bytes.len()))?;

        Ok(Self((u64::from_be_bytes(arr) ^ (1 << 63)) as i64))
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Time {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Encode for Time {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_i64::<BigEndian>(self.0)?;
        Ok(())
    }
}

impl Decode for Time {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let ticks = reader.read_i64::<BigEndian>()?;
        Ok(Self(ticks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn time_key_ordering() {
        let points = [
            Time::MIN,
            Time::new(-5),
            Time::new(-1),
            Time::new(0),
            Time::new(1),
            Time::new(1_000),
            Time::MAX,
        ];

        for pair in points.windows(2) {
            assert!(pair[0].to_key() < pair[1].to_key(), "{pair:?}");
        }
    }

    #[test]
    fn time_key_roundtrip() -> Result<(), DecodeError> {
        for t in [Time::MIN, Time::new(-42), Time::new(0), Time::new(42), Time::MAX] {
            assert_eq!(t, Time::from_key(&t.to_key())?);
        }
        Ok(())
    }

    #[test]
    fn time_step_saturates() {
        assert_eq!(Time::MAX, Time::MAX.next());
        assert_eq!(Time::MIN, Time::MIN.prev());
        assert_eq!(Time::new(1), Time::new(0).next());
        assert_eq!(Time::new(-1), Time::new(0).prev());
    }
}
