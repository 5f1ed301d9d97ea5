// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{status::StatusStore, table::SegmentTable, SegmentStatus, SegmentedKey};
use crate::{
    retry::{run_with_retry, RetryPolicy},
    update::{update_segment, UpdateOptions},
    SeriesSource, SeriesValue,
};
use std::time::Duration;

/// Drives the segment initialization state machine
///
/// ```text
///   (none) ──────► set Initializing ── init under retry ──► set Complete
///      ▲                                     │
///      └── purge chunks, clear status ◄── observed Initializing
///                                           (crash leftover)
///   Complete ──► no-op
/// ```
///
/// Candidates are serialized by the segment's monitor mutex, so for one
/// segment at most one source download runs on the success path; late
/// candidates observe `Complete` and return immediately.
pub struct Lifecycle<'a, V: SeriesValue> {
    pub table: &'a SegmentTable<V>,
    pub status: &'a StatusStore,
    pub source: &'a dyn SeriesSource<V>,
    pub retry: &'a RetryPolicy,
    pub update: &'a UpdateOptions,
    pub lock_timeout: Duration,
}

impl<V: SeriesValue> Lifecycle<'_, V> {
    /// Materializes the segment unless it is already complete.
    ///
    /// Returns `true` if this call performed the initialization.
    pub fn ensure_initialized(&self, seg: &SegmentedKey) -> crate::Result<bool> {
        let lock = self.table.lock(seg);
        let _monitor = lock.monitor.lock();

        {
            let _read = lock.rw.read();

            if self.status.get(seg)? == Some(SegmentStatus::Complete) {
                return Ok(false);
            }
        }

        self.check_availability(seg)?;

        let _write = lock.write_within(self.lock_timeout)?;

        match self.status.get(seg)? {
            Some(SegmentStatus::Complete) => return Ok(false),
            Some(SegmentStatus::Initializing) => {
                // a previous attempt crashed; its partial data is unusable
                log::warn!("recovering segment {seg} from a crashed initialization");
                self.table.delete_range(seg)?;
                self.status.delete(seg)?;
            }
            None => {}
        }

        self.status.put(seg, SegmentStatus::Initializing)?;

        run_with_retry(self.retry, &seg.to_string(), || {
            let result = self.init_segment(seg);

            if matches!(result, Err(crate::Error::IncompleteUpdate)) {
                self.table.delete_range(seg)?;
            }

            result
        })?;

        if self.table.is_empty_or_inconsistent(seg)? {
            return Err(crate::Error::InvariantViolation(format!(
                "initialization of segment {seg} should have added at least one entry",
            )));
        }

        self.status.put(seg, SegmentStatus::Complete)?;
        log::debug!("initialized segment {seg}");

        Ok(true)
    }

    fn check_availability(&self, seg: &SegmentedKey) -> crate::Result<()> {
        let (Some(first), Some(last)) = (
            self.source.first_available_from(),
            self.source.last_available_to(),
        ) else {
            return Err(crate::Error::InvariantViolation(format!(
                "segment {seg} requested while nothing is available",
            )));
        };

        if seg.range.to() < first {
            return Err(crate::Error::InvariantViolation(format!(
                "segment {seg} predates the availability window starting at {first}",
            )));
        }

        if seg.range.to() > last {
            return Err(crate::Error::InvariantViolation(format!(
                "segment {seg} postdates the availability window ending at {last}",
            )));
        }

        Ok(())
    }

    fn init_segment(&self, seg: &SegmentedKey) -> crate::Result<()> {
        let elements = self.source.download_segment_elements(&seg.range)?;

        update_segment(self.table, seg, None, Vec::new(), elements, self.update)?;

        Ok(())
    }
}
