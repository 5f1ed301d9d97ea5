// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{Time, TimeRange};

/// Maps time points onto segments
///
/// The finder must tile the time line deterministically: for any two time
/// points, the produced segments either coincide or are disjoint, and
/// every time point falls into exactly one segment.
pub trait SegmentFinder: Send + Sync {
    /// Returns the segment containing the given time point.
    fn segment_of(&self, t: Time) -> TimeRange;
}

/// Tiles the time line into windows of uniform width
///
/// Window n covers `[n * width, (n + 1) * width - 1]`.
#[derive(Copy, Clone, Debug)]
pub struct FixedWindowFinder {
    width: i64,
}

impl FixedWindowFinder {
    /// Creates a finder with the given window width in ticks.
    ///
    /// # Panics
    ///
    /// Panics if `width < 1`.
    #[must_use]
    pub fn new(width: i64) -> Self {
        assert!(width >= 1, "window width must be positive");
        Self { width }
    }
}

impl SegmentFinder for FixedWindowFinder {
    fn segment_of(&self, t: Time) -> TimeRange {
        let width = i128::from(self.width);
        let idx = i128::from(t.ticks()).div_euclid(width);

        let from = (idx * width).clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64;
        let to = (idx * width + width - 1).clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64;

        TimeRange::new(Time::new(from), Time::new(to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn fixed_window_tiling() {
        let finder = FixedWindowFinder::new(10);

        assert_eq!(
            TimeRange::new(Time::new(0), Time::new(9)),
            finder.segment_of(Time::new(0)),
        );
        assert_eq!(
            TimeRange::new(Time::new(0), Time::new(9)),
            finder.segment_of(Time::new(9)),
        );
        assert_eq!(
            TimeRange::new(Time::new(10), Time::new(19)),
            finder.segment_of(Time::new(10)),
        );
        assert_eq!(
            TimeRange::new(Time::new(-10), Time::new(-1)),
            finder.segment_of(Time::new(-1)),
        );
    }

    #[test]
    fn fixed_window_tiles_are_adjacent() {
        let finder = FixedWindowFinder::new(7);

        let mut prev = finder.segment_of(Time::new(-100));

        for _ in 0..50 {
            let next = finder.segment_of(prev.to().next());
            assert_eq!(prev.to().next(), next.from());
            prev = next;
        }
    }

    #[test]
    fn fixed_window_saturates_at_edges() {
        let finder = FixedWindowFinder::new(1_000);
        let seg = finder.segment_of(Time::MAX);
        assert!(seg.contains(Time::MAX));
        let seg = finder.segment_of(Time::MIN);
        assert!(seg.contains(Time::MIN));
    }
}
