// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{Time, TimeRange};

/// Source of truth for a segment's contents
///
/// The store materializes a segment lazily on first access by pulling all
/// elements of its time range from this source. The availability window
/// bounds which segments may be materialized at all.
pub trait SeriesSource<V>: Send + Sync {
    /// Returns a lazy iterator over all elements of the given segment,
    /// ordered by non-decreasing time.
    fn download_segment_elements(
        &self,
        range: &TimeRange,
    ) -> crate::Result<Box<dyn Iterator<Item = V> + Send + '_>>;

    /// Lower bound of the availability window, or `None` if the series
    /// has no data at all.
    fn first_available_from(&self) -> Option<Time>;

    /// Upper bound of the availability window, or `None` if the series
    /// has no data at all.
    fn last_available_to(&self) -> Option<Time>;
}
