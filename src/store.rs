// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    lookup::{decode_memo, encode_memo, shift_key, LookupCache, Memo},
    retry::RetryPolicy,
    segment::{
        enumerate::{ForwardSegments, ReverseSegments},
        lifecycle::Lifecycle,
        status::StatusStore,
        table::{SegmentTable, SegmentValues},
        SegmentStatus, SegmentedKey,
    },
    table::OrderedTable,
    update::UpdateOptions,
    SegmentFinder, SeriesSource, SeriesValue, Time,
};
use parking_lot::{Mutex, RwLock};
use std::{sync::Arc, time::Duration};

/// The inner state of a series store
pub struct StoreInner<V: SeriesValue> {
    pub(crate) hash_key: Arc<str>,
    pub(crate) source: Arc<dyn SeriesSource<V>>,
    pub(crate) finder: Arc<dyn SegmentFinder>,

    pub(crate) table: SegmentTable<V>,
    pub(crate) status: StatusStore,

    latest_table: Arc<dyn OrderedTable>,
    previous_table: Arc<dyn OrderedTable>,
    next_table: Arc<dyn OrderedTable>,

    latest_cache: LookupCache<Time>,
    previous_cache: LookupCache<(Time, u32)>,
    next_cache: LookupCache<(Time, u32)>,

    /// Set-once first/last value of the current data generation; cleared
    /// on every mutation
    cached_first: RwLock<Option<Option<V>>>,
    cached_last: RwLock<Option<Option<V>>>,

    /// Serializes `prepare_for_update` / `delete_all` against themselves
    mutate_monitor: Mutex<()>,

    pub(crate) retry: RetryPolicy,
    pub(crate) update_opts: UpdateOptions,
    pub(crate) lock_timeout: Duration,
}

/// A lazily materialized, segmented view of one keyed time series
///
/// Segments are pulled from the [`SeriesSource`] on first access and
/// persisted as compressed chunk files; queries transparently span all
/// segments their window touches.
///
/// Cheap to clone; all clones share the same state.
pub struct SeriesStore<V: SeriesValue>(Arc<StoreInner<V>>);

impl<V: SeriesValue> Clone for SeriesStore<V> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<V: SeriesValue> std::ops::Deref for SeriesStore<V> {
    type Target = StoreInner<V>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[allow(clippy::too_many_arguments)]
impl<V: SeriesValue> SeriesStore<V> {
    pub(crate) fn new(
        hash_key: Arc<str>,
        source: Arc<dyn SeriesSource<V>>,
        finder: Arc<dyn SegmentFinder>,
        table: SegmentTable<V>,
        status: StatusStore,
        lookup_tables: (Arc<dyn OrderedTable>, Arc<dyn OrderedTable>, Arc<dyn OrderedTable>),
        cache_capacity: usize,
        eviction: crate::EvictionMode,
        retry: RetryPolicy,
        update_opts: UpdateOptions,
        lock_timeout: Duration,
    ) -> Self {
        let (latest_table, previous_table, next_table) = lookup_tables;

        Self(Arc::new(StoreInner {
            hash_key,
            source,
            finder,
            table,
            status,
            latest_table,
            previous_table,
            next_table,
            latest_cache: LookupCache::new(cache_capacity, eviction),
            previous_cache: LookupCache::new(cache_capacity, eviction),
            next_cache: LookupCache::new(cache_capacity, eviction),
            cached_first: RwLock::new(None),
            cached_last: RwLock::new(None),
            mutate_monitor: Mutex::new(()),
            retry,
            update_opts,
            lock_timeout,
        }))
    }

    /// The stable identity of this series.
    #[must_use]
    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle<'_, V> {
        Lifecycle {
            table: &self.table,
            status: &self.status,
            source: &*self.source,
            retry: &self.retry,
            update: &self.update_opts,
            lock_timeout: self.lock_timeout,
        }
    }

    pub(crate) fn availability(&self) -> Option<(Time, Time)> {
        match (
            self.source.first_available_from(),
            self.source.last_available_to(),
        ) {
            (Some(first), Some(last)) if first <= last => Some((first, last)),
            _ => None,
        }
    }

    pub(crate) fn segmented(&self, range: crate::TimeRange) -> SegmentedKey {
        SegmentedKey::new(Arc::clone(&self.hash_key), range)
    }

    fn decode_value(bytes: &[u8]) -> crate::Result<V> {
        V::decode_from_slice(bytes).map_err(crate::Error::Decode)
    }

    fn decode_memoized(memo: Memo) -> crate::Result<Option<V>> {
        memo.as_deref().map(Self::decode_value).transpose()
    }

    fn memo_of(value: Option<&V>) -> crate::Result<Memo> {
        value
            .map(|v| v.encode_into_vec().map_err(crate::Error::Encode))
            .transpose()
    }

    /// Ordered values with time in [from, to], ascending.
    ///
    /// The window is clipped to the availability window; every touched
    /// segment is initialized on demand.
    pub fn read_range_values(&self, from: Time, to: Time) -> RangeValues<V> {
        let Some((first, last)) = self.availability() else {
            return RangeValues::empty(self.clone());
        };

        let from = from.max(first);
        let to = to.min(last);

        if from > to {
            return RangeValues::empty(self.clone());
        }

        RangeValues {
            store: self.clone(),
            segments: Segments::Forward(ForwardSegments::new(
                Arc::clone(&self.finder),
                from,
                to,
            )),
            from,
            to,
            current: None,
            reverse: false,
            done: false,
        }
    }

    /// Ordered values with time in [to, from], walking from `from` down
    /// to `to`.
    pub fn read_range_values_rev(&self, from: Time, to: Time) -> RangeValues<V> {
        let Some((first, last)) = self.availability() else {
            return RangeValues::empty(self.clone());
        };

        let lo = to.max(first);
        let hi = from.min(last);

        if lo > hi {
            return RangeValues::empty(self.clone());
        }

        RangeValues {
            store: self.clone(),
            segments: Segments::Reverse(ReverseSegments::new(
                Arc::clone(&self.finder),
                lo,
                hi,
            )),
            from: lo,
            to: hi,
            current: None,
            reverse: true,
            done: false,
        }
    }

    /// The value with the greatest time <= `t`.
    ///
    /// If every stored value lies after `t`, this clamps to the first
    /// value of the series. Results (including misses) are memoized.
    pub fn get_latest_value(&self, t: Time) -> crate::Result<Option<V>> {
        if let Some(memo) = self.latest_cache.get(&t) {
            return Self::decode_memoized(memo);
        }

        if let Some(row) = self.latest_table.get(&self.hash_key, &t.to_key())? {
            let memo = decode_memo(&row)?;
            self.latest_cache.insert(t, memo.clone());
            return Self::decode_memoized(memo);
        }

        let result = self.compute_latest(t)?;

        let memo = Self::memo_of(result.as_ref())?;
        self.latest_table
            .put(&self.hash_key, &t.to_key(), encode_memo(&memo))?;
        self.latest_cache.insert(t, memo);

        Ok(result)
    }

    fn compute_latest(&self, t: Time) -> crate::Result<Option<V>> {
        if let Some((first, last)) = self.availability() {
            let until = t.min(last);

            if until >= first {
                for range in ReverseSegments::new(Arc::clone(&self.finder), first, until) {
                    let seg = self.segmented(range);
                    self.lifecycle().ensure_initialized(&seg)?;

                    // the first segment that can contribute wins; all
                    // earlier segments only hold older values
                    if let Some(value) = self.table.latest_value(&seg, t)? {
                        return Ok(Some(value));
                    }
                }
            }
        }

        self.get_first_value()
    }

    /// The `shift`-th element of the reverse walk starting at `t`
    /// (`shift = 1` is the latest value with time <= `t`).
    pub fn get_previous_value(&self, t: Time, shift: usize) -> crate::Result<Option<V>> {
        if shift == 0 {
            return Err(crate::Error::InvalidShift(shift));
        }

        let cache_key = (t, shift as u32);

        if let Some(memo) = self.previous_cache.get(&cache_key) {
            return Self::decode_memoized(memo);
        }

        let row_key = shift_key(t, shift as u32);

        if let Some(row) = self.previous_table.get(&self.hash_key, &row_key)? {
            let memo = decode_memo(&row)?;
            self.previous_cache.insert(cache_key, memo.clone());
            return Self::decode_memoized(memo);
        }

        let result = self
            .read_range_values_rev(t, Time::MIN)
            .nth(shift - 1)
            .transpose()?;

        let memo = Self::memo_of(result.as_ref())?;
        self.previous_table
            .put(&self.hash_key, &row_key, encode_memo(&memo))?;
        self.previous_cache.insert(cache_key, memo);

        Ok(result)
    }

    /// The `shift`-th element of the forward walk starting at `t`
    /// (`shift = 1` is the earliest value with time >= `t`).
    pub fn get_next_value(&self, t: Time, shift: usize) -> crate::Result<Option<V>> {
        if shift == 0 {
            return Err(crate::Error::InvalidShift(shift));
        }

        let cache_key = (t, shift as u32);

        if let Some(memo) = self.next_cache.get(&cache_key) {
            return Self::decode_memoized(memo);
        }

        let row_key = shift_key(t, shift as u32);

        if let Some(row) = self.next_table.get(&self.hash_key, &row_key)? {
            let memo = decode_memo(&row)?;
            self.next_cache.insert(cache_key, memo.clone());
            return Self::decode_memoized(memo);
        }

        let result = self
            .read_range_values(t, Time::MAX)
            .nth(shift - 1)
            .transpose()?;

        let memo = Self::memo_of(result.as_ref())?;
        self.next_table
            .put(&self.hash_key, &row_key, encode_memo(&memo))?;
        self.next_cache.insert(cache_key, memo);

        Ok(result)
    }

    /// The first value of the series, or `None` if nothing is available.
    pub fn get_first_value(&self) -> crate::Result<Option<V>> {
        if let Some(cached) = self.cached_first.read().clone() {
            return Ok(cached);
        }

        let computed = match self.availability() {
            None => None,
            Some((first, _)) => {
                let seg = self.segmented(self.finder.segment_of(first));
                self.lifecycle().ensure_initialized(&seg)?;
                self.table.first_value(&seg)?
            }
        };

        *self.cached_first.write() = Some(computed.clone());

        Ok(computed)
    }

    /// The last value of the series, or `None` if nothing is available.
    pub fn get_last_value(&self) -> crate::Result<Option<V>> {
        if let Some(cached) = self.cached_last.read().clone() {
            return Ok(cached);
        }

        let computed = match self.availability() {
            None => None,
            Some((_, last)) => {
                let seg = self.segmented(self.finder.segment_of(last));
                self.lifecycle().ensure_initialized(&seg)?;
                self.table.last_value(&seg)?
            }
        };

        *self.cached_last.write() = Some(computed.clone());

        Ok(computed)
    }

    /// Last value of the newest complete segment, without initializing
    /// anything.
    fn last_complete_value(&self) -> crate::Result<Option<V>> {
        let rows = self.status.scan(&self.hash_key)?;

        for (range, status) in rows.into_iter().rev() {
            if status == SegmentStatus::Complete {
                return self.table.last_value(&self.segmented(range));
            }
        }

        Ok(None)
    }

    /// Invalidates everything an append may change: latest memos at or
    /// after the current last time, all shift memos, and the in-memory
    /// caches.
    ///
    /// Returns the current last value so the caller can deduplicate the
    /// update boundary.
    pub fn prepare_for_update(&self) -> crate::Result<Option<V>> {
        let _monitor = self.mutate_monitor.lock();

        let last = self.last_complete_value()?;

        match &last {
            Some(value) => {
                self.latest_table.delete_range(
                    &self.hash_key,
                    Some(&value.time().to_key()),
                    None,
                )?;
            }
            None => {
                self.latest_table.delete_range(&self.hash_key, None, None)?;
            }
        }

        self.previous_table.delete_range(&self.hash_key, None, None)?;
        self.next_table.delete_range(&self.hash_key, None, None)?;

        self.clear_memory_caches();

        Ok(last)
    }

    /// Deletes every segment, chunk file, status row and lookup row of
    /// this series.
    pub fn delete_all(&self) -> crate::Result<()> {
        let _monitor = self.mutate_monitor.lock();

        log::debug!("deleting all data of series {}", self.hash_key);

        for (range, _) in self.status.scan(&self.hash_key)? {
            self.table.delete_range(&self.segmented(range))?;
        }

        self.status.delete_all(&self.hash_key)?;
        self.latest_table.delete_range(&self.hash_key, None, None)?;
        self.previous_table.delete_range(&self.hash_key, None, None)?;
        self.next_table.delete_range(&self.hash_key, None, None)?;

        self.clear_memory_caches();

        Ok(())
    }

    pub(crate) fn clear_memory_caches(&self) {
        self.latest_cache.clear();
        self.previous_cache.clear();
        self.next_cache.clear();
        *self.cached_first.write() = None;
        *self.cached_last.write() = None;
    }

    /// Inspects whether the series holds no usable data
    ///
    /// A deserialization failure on the boundary values reports `true`
    /// (the codec changed underneath the stored data); other faults
    /// propagate. A complete segment without intact chunks also reports
    /// `true`, as does a series without any status rows.
    pub fn is_empty_or_inconsistent(&self) -> crate::Result<bool> {
        let boundary: crate::Result<()> = (|| {
            self.get_first_value()?;
            self.get_last_value()?;
            Ok(())
        })();

        match boundary {
            Ok(()) => {}
            Err(crate::Error::Decode(_)) => return Ok(true),
            Err(e) => return Err(e),
        }

        let rows = self.status.scan(&self.hash_key)?;

        if rows.is_empty() {
            return Ok(true);
        }

        for (range, status) in rows {
            if status == SegmentStatus::Complete
                && self.table.is_empty_or_inconsistent(&self.segmented(range))?
            {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

enum Segments {
    Forward(ForwardSegments),
    Reverse(ReverseSegments),
    Empty,
}

impl Iterator for Segments {
    type Item = crate::TimeRange;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Forward(iter) => iter.next(),
            Self::Reverse(iter) => iter.next(),
            Self::Empty => None,
        }
    }
}

/// Ordered stream of values over all segments a query window touches
///
/// Segments are entered lazily; each is initialized (if necessary) and
/// streamed clipped to the window before the next one is touched.
pub struct RangeValues<V: SeriesValue> {
    store: SeriesStore<V>,
    segments: Segments,
    from: Time,
    to: Time,
    current: Option<SegmentValues<V>>,
    reverse: bool,
    done: bool,
}

impl<V: SeriesValue> RangeValues<V> {
    fn empty(store: SeriesStore<V>) -> Self {
        Self {
            store,
            segments: Segments::Empty,
            from: Time::MAX,
            to: Time::MIN,
            current: None,
            reverse: false,
            done: true,
        }
    }

    fn enter_segment(&mut self, range: crate::TimeRange) -> crate::Result<SegmentValues<V>> {
        let seg = self.store.segmented(range);

        self.store.lifecycle().ensure_initialized(&seg)?;

        let lo = self.from.max(range.from());
        let hi = self.to.min(range.to());

        // chunk files are write-once, so streaming can continue after
        // the metadata snapshot is taken under the read lock
        let lock = self.store.table.lock(&seg);
        let _read = lock.rw.read();

        if self.reverse {
            self.store.table.range_values_rev(&seg, lo, hi)
        } else {
            self.store.table.range_values(&seg, lo, hi)
        }
    }
}

impl<V: SeriesValue> Iterator for RangeValues<V> {
    type Item = crate::Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if let Some(current) = &mut self.current {
                match current.next() {
                    Some(Ok(item)) => return Some(Ok(item)),
                    Some(Err(e)) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                    None => self.current = None,
                }
            }

            let Some(range) = self.segments.next() else {
                self.done = true;
                return None;
            };

            match self.enter_segment(range) {
                Ok(values) => self.current = Some(values),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
