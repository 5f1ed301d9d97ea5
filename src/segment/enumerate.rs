// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{SegmentFinder, Time, TimeRange};
use std::sync::Arc;

/// What to do with a segment produced by the finder
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Verdict {
    /// Yield the segment
    Continue,

    /// Drop the segment, keep enumerating
    Skip,

    /// End the enumeration
    Stop,
}

/// Lazy forward enumeration of the segments overlapping [from, to]
///
/// Walks the finder's tiling from `from` upward. Segments entirely below
/// the window are dropped (the finder should never produce them);
/// the first segment starting beyond `to` terminates the walk.
pub struct ForwardSegments {
    finder: Arc<dyn SegmentFinder>,
    next: Option<TimeRange>,
    from: Time,
    to: Time,
    stopped: bool,
}

impl ForwardSegments {
    pub fn new(finder: Arc<dyn SegmentFinder>, from: Time, to: Time) -> Self {
        let next = (from <= to).then(|| finder.segment_of(from));

        Self {
            finder,
            next,
            from,
            to,
            stopped: false,
        }
    }

    fn verdict(&self, seg: &TimeRange) -> Verdict {
        if seg.to() < self.from {
            Verdict::Skip
        } else if seg.from() > self.to {
            Verdict::Stop
        } else {
            Verdict::Continue
        }
    }
}

impl Iterator for ForwardSegments {
    type Item = TimeRange;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.stopped {
                return None;
            }

            let seg = self.next.take()?;

            self.next = (seg.to() < Time::MAX).then(|| self.finder.segment_of(seg.to().next()));

            match self.verdict(&seg) {
                Verdict::Continue => return Some(seg),
                Verdict::Skip => {
                    debug_assert!(false, "finder produced segment {seg} below {}", self.from);
                }
                Verdict::Stop => {
                    self.stopped = true;
                    return None;
                }
            }
        }
    }
}

/// Lazy reverse enumeration of the segments overlapping [from, to]
///
/// Seeds with the segment containing `to` and steps to the segment one
/// tick before the current one's start. Stops after yielding the segment
/// that covers `from`.
pub struct ReverseSegments {
    finder: Arc<dyn SegmentFinder>,
    cur: Option<TimeRange>,
    from: Time,
}

impl ReverseSegments {
    pub fn new(finder: Arc<dyn SegmentFinder>, from: Time, to: Time) -> Self {
        let cur = (from <= to).then(|| finder.segment_of(to));

        Self { finder, cur, from }
    }
}

impl Iterator for ReverseSegments {
    type Item = TimeRange;

    fn next(&mut self) -> Option<Self::Item> {
        let seg = self.cur.take()?;

        if seg.to() < self.from {
            return None;
        }

        if seg.from() > self.from && seg.from() > Time::MIN {
            self.cur = Some(self.finder.segment_of(seg.from().prev()));
        }

        Some(seg)
    }
}
