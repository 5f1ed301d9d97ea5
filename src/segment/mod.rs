// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub(crate) mod enumerate;
pub(crate) mod lifecycle;
pub(crate) mod lock;
pub(crate) mod status;
pub(crate) mod table;

use crate::TimeRange;
use std::sync::Arc;

/// Identifies one segment of one series: (hash key, time range)
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SegmentedKey {
    /// Stable series identity
    pub hash_key: Arc<str>,

    /// The segment's time range
    pub range: TimeRange,
}

impl SegmentedKey {
    /// Creates a segmented key.
    #[must_use]
    pub fn new(hash_key: Arc<str>, range: TimeRange) -> Self {
        Self { hash_key, range }
    }

    /// Stable identity string of this (series, segment) pair, used as the
    /// hash key of the chunk table and as the on-disk folder name.
    #[must_use]
    pub fn segmented_hash_key(&self) -> String {
        format!(
            "{}_{}_{}",
            self.hash_key,
            self.range.from().ticks(),
            self.range.to().ticks(),
        )
    }
}

impl std::fmt::Display for SegmentedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.hash_key, self.range)
    }
}

/// Initialization state of a segment
///
/// A missing status row means the segment was never attempted.
/// `Initializing` on observation means a previous attempt crashed and
/// left partial data that must be purged before a retry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SegmentStatus {
    /// Materialization started but did not finish
    Initializing,

    /// Segment is fully materialized and consistent
    Complete,
}

impl From<SegmentStatus> for u8 {
    fn from(value: SegmentStatus) -> Self {
        match value {
            SegmentStatus::Initializing => 0,
            SegmentStatus::Complete => 1,
        }
    }
}

impl TryFrom<u8> for SegmentStatus {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Initializing),
            1 => Ok(Self::Complete),
            _ => Err(()),
        }
    }
}
