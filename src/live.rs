// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    retry::run_with_retry,
    segment::SegmentStatus,
    store::{RangeValues, SeriesStore},
    update::update_segment,
    SeriesSource, SeriesValue, Time, TimeRange,
};
use parking_lot::RwLock;
use std::{marker::PhantomData, sync::Arc};

/// Envelope of all segments promoted from the live overlay
///
/// Acts as the availability window of the historical store underneath a
/// [`LiveSeriesStore`].
#[derive(Default)]
pub(crate) struct PromotedBounds {
    inner: RwLock<Option<(Time, Time)>>,
}

impl PromotedBounds {
    fn get(&self) -> Option<(Time, Time)> {
        *self.inner.read()
    }

    fn extend(&self, range: TimeRange) {
        let mut bounds = self.inner.write();

        *bounds = Some(match *bounds {
            None => (range.from(), range.to()),
            Some((first, _)) => (first.min(range.from()), range.to()),
        });
    }

    fn clear(&self) {
        *self.inner.write() = None;
    }
}

/// Source of the historical store underneath a live overlay
///
/// Promoted segments are written directly and marked complete, so this
/// source is only consulted for its availability bounds; a download can
/// only happen for a time range the overlay never wrote, which yields
/// nothing and surfaces the empty-segment violation.
pub(crate) struct PromotedSource<V> {
    pub(crate) bounds: Arc<PromotedBounds>,
    pub(crate) _marker: PhantomData<fn() -> V>,
}

impl<V: SeriesValue> SeriesSource<V> for PromotedSource<V> {
    fn download_segment_elements(
        &self,
        _range: &TimeRange,
    ) -> crate::Result<Box<dyn Iterator<Item = V> + Send + '_>> {
        Ok(Box::new(std::iter::empty()))
    }

    fn first_available_from(&self) -> Option<Time> {
        self.bounds.get().map(|(first, _)| first)
    }

    fn last_available_to(&self) -> Option<Time> {
        self.bounds.get().map(|(_, last)| last)
    }
}

struct LiveSegment<V> {
    range: TimeRange,
    values: Vec<V>,
}

impl<V: SeriesValue> LiveSegment<V> {
    /// Values with time in [lo, hi], in insertion order.
    fn clipped(&self, lo: Time, hi: Time) -> Vec<V> {
        let start = self.values.partition_point(|v| v.time() < lo);
        let end = self.values.partition_point(|v| v.time() <= hi);

        self.values.get(start..end).unwrap_or_default().to_vec()
    }

    fn latest_at_or_before(&self, t: Time) -> Option<&V> {
        let idx = self.values.partition_point(|v| v.time() <= t);
        idx.checked_sub(1).and_then(|idx| self.values.get(idx))
    }
}

/// A series store with an in-memory tail segment
///
/// Values are appended in time order into the live segment; once a value
/// belongs to a later segment, the live segment is promoted to a
/// historical one and a fresh live segment is opened. Queries merge the
/// live tail with the historical segments transparently.
pub struct LiveSeriesStore<V: SeriesValue> {
    historical: SeriesStore<V>,
    bounds: Arc<PromotedBounds>,
    live: RwLock<Option<LiveSegment<V>>>,
}

impl<V: SeriesValue> LiveSeriesStore<V> {
    pub(crate) fn new(historical: SeriesStore<V>, bounds: Arc<PromotedBounds>) -> Self {
        Self {
            historical,
            bounds,
            live: RwLock::new(None),
        }
    }

    /// The historical store underneath the overlay.
    #[must_use]
    pub fn historical(&self) -> &SeriesStore<V> {
        &self.historical
    }

    /// Appends the next value of the series.
    ///
    /// Times must be non-decreasing over all appended values; a value
    /// whose time falls into a later segment first promotes the current
    /// live segment to a historical one.
    pub fn put_next_live_value(&self, value: V) -> crate::Result<()> {
        let t = value.time();
        let mut live = self.live.write();

        let rolls_over = matches!(&*live, Some(seg) if t > seg.range.to());

        if rolls_over {
            if let Some(seg) = live.take() {
                if let Err(e) = self.promote(&seg) {
                    *live = Some(seg);
                    return Err(e);
                }
            }
        }

        if let Some(seg) = live.as_mut() {
            if seg.values.last().is_some_and(|last| t < last.time()) {
                return Err(crate::Error::InvariantViolation(format!(
                    "out-of-order value at {t} appended to live segment {}",
                    seg.range,
                )));
            }

            seg.values.push(value);
        } else {
            *live = Some(self.open_live_segment(value)?);
        }

        Ok(())
    }

    fn open_live_segment(&self, value: V) -> crate::Result<LiveSegment<V>> {
        let t = value.time();
        let range = self.historical.finder.segment_of(t);

        if let Some((_, promoted_to)) = self.bounds.get() {
            // a new live segment may only touch promoted data at the
            // single-tick overlap of a just-promoted segment
            if promoted_to >= range.from() && promoted_to != range.to() {
                return Err(crate::Error::InvariantViolation(format!(
                    "value at {t} is out of order against data already promoted through {promoted_to}",
                )));
            }
        }

        log::trace!("opening live segment {range}");

        Ok(LiveSegment {
            range,
            values: vec![value],
        })
    }

    fn promote(&self, seg: &LiveSegment<V>) -> crate::Result<()> {
        log::debug!("promoting live segment {} to historical", seg.range);

        if let Some((_, promoted_to)) = self.bounds.get() {
            if promoted_to > seg.range.to() {
                return Err(crate::Error::InvariantViolation(format!(
                    "live segment {} ends before already promoted data through {promoted_to}",
                    seg.range,
                )));
            }
        }

        let key = self.historical.segmented(seg.range);

        self.historical.prepare_for_update()?;

        let lock = self.historical.table.lock(&key);
        let _monitor = lock.monitor.lock();
        let _write = lock.write_within(self.historical.lock_timeout)?;

        self.historical.status.put(&key, SegmentStatus::Initializing)?;

        run_with_retry(&self.historical.retry, &key.to_string(), || {
            let result = update_segment(
                &self.historical.table,
                &key,
                None,
                Vec::new(),
                seg.values.iter().cloned(),
                &self.historical.update_opts,
            );

            if matches!(result, Err(crate::Error::IncompleteUpdate)) {
                self.historical.table.delete_range(&key)?;
            }

            result.map(|_| ())
        })?;

        if self.historical.table.is_empty_or_inconsistent(&key)? {
            return Err(crate::Error::InvariantViolation(format!(
                "promotion of segment {} should have written at least one entry",
                seg.range,
            )));
        }

        self.historical.status.put(&key, SegmentStatus::Complete)?;

        self.bounds.extend(seg.range);
        self.historical.clear_memory_caches();

        Ok(())
    }

    /// The first value of the series, preferring historical data.
    pub fn get_first_value(&self) -> crate::Result<Option<V>> {
        if let Some(value) = self.historical.get_first_value()? {
            return Ok(Some(value));
        }

        Ok(self
            .live
            .read()
            .as_ref()
            .and_then(|seg| seg.values.first().cloned()))
    }

    /// The last value of the series, preferring the live tail.
    pub fn get_last_value(&self) -> crate::Result<Option<V>> {
        if let Some(seg) = &*self.live.read() {
            if let Some(value) = seg.values.last() {
                return Ok(Some(value.clone()));
            }
        }

        self.historical.get_last_value()
    }

    /// The value with the greatest time <= `t` over live and historical
    /// data, clamping to the first value if everything lies after `t`.
    pub fn get_latest_value(&self, t: Time) -> crate::Result<Option<V>> {
        {
            let live = self.live.read();

            if let Some(value) = live.as_ref().and_then(|seg| seg.latest_at_or_before(t)) {
                return Ok(Some(value.clone()));
            }
        }

        if let Some(value) = self.historical.get_latest_value(t)? {
            if value.time() <= t {
                return Ok(Some(value));
            }
        }

        self.get_first_value()
    }

    /// The `shift`-th element of the merged reverse walk starting at `t`.
    pub fn get_previous_value(&self, t: Time, shift: usize) -> crate::Result<Option<V>> {
        if shift == 0 {
            return Err(crate::Error::InvalidShift(shift));
        }

        if !self.live_covers(t) {
            return self.historical.get_previous_value(t, shift);
        }

        self.read_range_values_rev(t, Time::MIN)
            .nth(shift - 1)
            .transpose()
    }

    /// The `shift`-th element of the merged forward walk starting at `t`.
    pub fn get_next_value(&self, t: Time, shift: usize) -> crate::Result<Option<V>> {
        if shift == 0 {
            return Err(crate::Error::InvalidShift(shift));
        }

        if !self.live_covers(t) {
            return self.historical.get_next_value(t, shift);
        }

        self.read_range_values(t, Time::MAX)
            .nth(shift - 1)
            .transpose()
    }

    fn live_covers(&self, t: Time) -> bool {
        self.live
            .read()
            .as_ref()
            .is_some_and(|seg| t >= seg.range.from())
    }

    /// Ordered values with time in [from, to], ascending, merged over
    /// historical segments and the live tail.
    pub fn read_range_values(&self, from: Time, to: Time) -> LiveRangeValues<V> {
        let live = self.live.read();

        let Some(seg) = live.as_ref() else {
            return LiveRangeValues::historical(self.historical.read_range_values(from, to));
        };

        let live_from = seg.range.from();

        if live_from > to {
            return LiveRangeValues::historical(self.historical.read_range_values(from, to));
        }

        if live_from <= from {
            return LiveRangeValues::live(seg.clipped(from, to));
        }

        LiveRangeValues {
            first: Some(Part::Historical(
                self.historical.read_range_values(from, live_from.prev()),
            )),
            second: Some(Part::Live(seg.clipped(live_from, to).into_iter())),
        }
    }

    /// Ordered values with time in [to, from], descending from `from`,
    /// merged over the live tail and historical segments.
    pub fn read_range_values_rev(&self, from: Time, to: Time) -> LiveRangeValues<V> {
        let live = self.live.read();

        let Some(seg) = live.as_ref() else {
            return LiveRangeValues::historical(self.historical.read_range_values_rev(from, to));
        };

        let live_from = seg.range.from();

        if live_from > from {
            return LiveRangeValues::historical(self.historical.read_range_values_rev(from, to));
        }

        if live_from <= to {
            let mut values = seg.clipped(to, from);
            values.reverse();
            return LiveRangeValues::live(values);
        }

        let mut values = seg.clipped(live_from, from);
        values.reverse();

        LiveRangeValues {
            first: Some(Part::Live(values.into_iter())),
            second: Some(Part::Historical(
                self.historical.read_range_values_rev(live_from.prev(), to),
            )),
        }
    }

    /// Drops the live tail and deletes all historical data.
    pub fn delete_all(&self) -> crate::Result<()> {
        let mut live = self.live.write();

        *live = None;
        self.historical.delete_all()?;
        self.bounds.clear();

        Ok(())
    }

    /// Returns `true` if neither the live tail nor the historical store
    /// holds usable data.
    pub fn is_empty_or_inconsistent(&self) -> crate::Result<bool> {
        if self
            .live
            .read()
            .as_ref()
            .is_some_and(|seg| !seg.values.is_empty())
        {
            return Ok(false);
        }

        self.historical.is_empty_or_inconsistent()
    }
}

enum Part<V: SeriesValue> {
    Historical(RangeValues<V>),
    Live(std::vec::IntoIter<V>),
}

impl<V: SeriesValue> Iterator for Part<V> {
    type Item = crate::Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Historical(iter) => iter.next(),
            Self::Live(iter) => iter.next().map(Ok),
        }
    }
}

/// Ordered stream over the concatenation of a historical part and a
/// live part (either may be absent)
pub struct LiveRangeValues<V: SeriesValue> {
    first: Option<Part<V>>,
    second: Option<Part<V>>,
}

impl<V: SeriesValue> LiveRangeValues<V> {
    fn historical(values: RangeValues<V>) -> Self {
        Self {
            first: Some(Part::Historical(values)),
            second: None,
        }
    }

    fn live(values: Vec<V>) -> Self {
        Self {
            first: Some(Part::Live(values.into_iter())),
            second: None,
        }
    }
}

impl<V: SeriesValue> Iterator for LiveRangeValues<V> {
    type Item = crate::Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some(part) = &mut self.first else {
                return None;
            };

            if let Some(item) = part.next() {
                return Some(item);
            }

            self.first = self.second.take();
        }
    }
}
