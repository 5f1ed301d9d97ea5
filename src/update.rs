// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    meta::ChunkMeta,
    segment::{table::SegmentTable, SegmentedKey},
    SeriesValue, Time, TimeRange,
};
use std::{
    collections::BTreeMap,
    sync::{
        mpsc::{sync_channel, Receiver},
        Arc,
    },
};

/// Knobs of the segment writer
#[derive(Clone, Debug)]
pub struct UpdateOptions {
    /// Values per chunk file
    pub batch_size: usize,

    /// Number of parallel chunk writers; `None` writes chunks on the
    /// calling thread
    pub parallel_workers: Option<usize>,

    /// Bound of the producer queue in the parallel path
    pub queue_depth: usize,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            parallel_workers: None,
            queue_depth: 50,
        }
    }
}

/// Outcome of one segment update
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UpdateSummary {
    /// Values written
    pub value_count: usize,

    /// Chunk files flushed
    pub chunk_count: usize,

    /// Time of the first written value
    pub min_time: Option<Time>,

    /// Time of the last written value
    pub max_time: Option<Time>,
}

/// Enforces non-decreasing times and the segment bounds while values are
/// pulled from the source
struct MonotonicGuard {
    range: TimeRange,
    last_max: Time,
}

impl MonotonicGuard {
    fn new(range: TimeRange) -> Self {
        Self {
            range,
            last_max: Time::MIN,
        }
    }

    fn check<V: SeriesValue>(&mut self, value: &V) -> crate::Result<()> {
        let t = value.time();

        if t < self.last_max {
            return Err(crate::Error::InvariantViolation(format!(
                "non-monotonic time {t} after {} in segment {}",
                self.last_max, self.range,
            )));
        }

        if t < self.range.from() {
            return Err(crate::Error::InvariantViolation(format!(
                "time {t} predates segment {}",
                self.range,
            )));
        }

        if value.end_time() > self.range.to() {
            return Err(crate::Error::InvariantViolation(format!(
                "end time {} postdates segment {}",
                value.end_time(),
                self.range,
            )));
        }

        self.last_max = t;

        Ok(())
    }
}

/// Pulls values from the source and writes them into the segment as
/// chunk files of at most `batch_size` values each.
///
/// The caller must hold the segment's write lock; initialization and
/// live promotion both call this under their own acquisition.
///
/// `last_values` are re-written boundary values of a redone chunk;
/// elements (of either origin) with time before `update_from` are
/// dropped, which deduplicates the chunk boundary.
///
/// A crash marker file is created before the first write and removed on
/// success. If it already exists, a previous update did not complete and
/// [`crate::Error::IncompleteUpdate`] is raised so the caller purges and
/// retries.
pub fn update_segment<V: SeriesValue>(
    table: &SegmentTable<V>,
    seg: &SegmentedKey,
    update_from: Option<Time>,
    last_values: Vec<V>,
    source: impl Iterator<Item = V>,
    opts: &UpdateOptions,
) -> crate::Result<UpdateSummary> {
    std::fs::create_dir_all(table.segment_folder(seg))?;

    let marker = table.update_lock_path(seg);

    if marker.try_exists()? {
        log::warn!("update marker of {seg} still exists, a previous update did not finish");
        return Err(crate::Error::IncompleteUpdate);
    }

    std::fs::File::create(&marker)?;

    let mut elements = last_values
        .into_iter()
        .chain(source)
        .filter(|v| update_from.is_none_or(|from| v.time() >= from));

    let mut guard = MonotonicGuard::new(seg.range);
    let first_index = table.next_flush_index(seg)?;

    let summary = match opts.parallel_workers {
        Some(workers) if workers > 1 => write_parallel(
            table,
            seg,
            &mut elements,
            &mut guard,
            first_index,
            workers,
            opts,
        )?,
        _ => write_serial(table, seg, &mut elements, &mut guard, first_index, opts)?,
    };

    std::fs::remove_file(&marker)?;

    log::debug!(
        "updated segment {seg}: {} values in {} chunks",
        summary.value_count,
        summary.chunk_count,
    );

    Ok(summary)
}

fn next_batch<V: SeriesValue>(
    elements: &mut impl Iterator<Item = V>,
    guard: &mut MonotonicGuard,
    batch_size: usize,
) -> crate::Result<Vec<V>> {
    let mut batch = Vec::new();

    while batch.len() < batch_size {
        let Some(value) = elements.next() else {
            break;
        };

        guard.check(&value)?;
        batch.push(value);
    }

    Ok(batch)
}

fn write_chunk<V: SeriesValue>(
    table: &SegmentTable<V>,
    seg: &SegmentedKey,
    flush_index: u64,
    batch: &[V],
) -> crate::Result<ChunkMeta> {
    let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
        return Err(crate::Error::InvariantViolation(
            "tried to flush an empty batch".into(),
        ));
    };

    let file = table.new_file(seg, flush_index)?;

    for value in batch {
        let payload = value.encode_into_vec().map_err(crate::Error::Encode)?;
        file.add(&payload)?;
    }

    file.close()?;

    Ok(ChunkMeta {
        path: file.path().to_string_lossy().into_owned(),
        flush_index,
        first_time: first.time(),
        last_time: last.time(),
        first_value: first.encode_into_vec().map_err(crate::Error::Encode)?,
        last_value: last.encode_into_vec().map_err(crate::Error::Encode)?,
    })
}

fn write_serial<V: SeriesValue>(
    table: &SegmentTable<V>,
    seg: &SegmentedKey,
    elements: &mut impl Iterator<Item = V>,
    guard: &mut MonotonicGuard,
    first_index: u64,
    opts: &UpdateOptions,
) -> crate::Result<UpdateSummary> {
    let mut summary = UpdateSummary::default();
    let mut flush_index = first_index;

    loop {
        let batch = next_batch(elements, guard, opts.batch_size)?;

        if batch.is_empty() {
            return Ok(summary);
        }

        let meta = write_chunk(table, seg, flush_index, &batch)?;
        table.finish_file(seg, &meta)?;

        summary.value_count += batch.len();
        summary.chunk_count += 1;
        summary.min_time.get_or_insert(meta.first_time);
        summary.max_time = Some(meta.last_time);

        flush_index += 1;
    }
}

/// Publishes chunk metadata strictly in flush-index order, regardless of
/// worker completion order, so readers only ever observe a prefix.
struct ReorderBuffer {
    pending: BTreeMap<u64, ChunkMeta>,
    next_publish: u64,
}

fn write_parallel<V: SeriesValue>(
    table: &SegmentTable<V>,
    seg: &SegmentedKey,
    elements: &mut impl Iterator<Item = V>,
    guard: &mut MonotonicGuard,
    first_index: u64,
    workers: usize,
    opts: &UpdateOptions,
) -> crate::Result<UpdateSummary> {
    let workers = workers
        .min(std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get))
        .max(1);

    let (tx, rx) = sync_channel::<(u64, Vec<V>)>(opts.queue_depth.max(1));
    let rx: Arc<parking_lot::Mutex<Receiver<(u64, Vec<V>)>>> = Arc::new(parking_lot::Mutex::new(rx));

    let failure: parking_lot::Mutex<Option<crate::Error>> = parking_lot::Mutex::new(None);
    let reorder = parking_lot::Mutex::new(ReorderBuffer {
        pending: BTreeMap::new(),
        next_publish: first_index,
    });

    let publish = |meta: ChunkMeta| -> crate::Result<()> {
        let mut buffer = reorder.lock();
        let ReorderBuffer {
            pending,
            next_publish,
        } = &mut *buffer;

        pending.insert(meta.flush_index, meta);

        while let Some(entry) = pending.first_entry() {
            if *entry.key() != *next_publish {
                break;
            }

            let meta = entry.remove();
            table.finish_file(seg, &meta)?;
            *next_publish += 1;
        }

        Ok(())
    };

    let mut summary = UpdateSummary::default();

    std::thread::scope(|scope| -> crate::Result<()> {
        for _ in 0..workers {
            let rx = Arc::clone(&rx);
            let failure = &failure;
            let publish = &publish;

            scope.spawn(move || {
                loop {
                    let message = {
                        let rx = rx.lock();
                        rx.recv()
                    };

                    let Ok((flush_index, batch)) = message else {
                        return;
                    };

                    let result =
                        write_chunk(table, seg, flush_index, &batch).and_then(publish);

                    if let Err(e) = result {
                        failure.lock().get_or_insert(e);
                        return;
                    }
                }
            });
        }

        // only workers keep the receiver alive now, so a send into a
        // fully-bailed-out pool errors instead of blocking forever
        drop(rx);

        let mut flush_index = first_index;

        loop {
            if failure.lock().is_some() {
                break;
            }

            let batch = next_batch(elements, guard, opts.batch_size)?;

            if batch.is_empty() {
                break;
            }

            summary.value_count += batch.len();
            summary.chunk_count += 1;
            summary.min_time.get_or_insert_with(|| {
                // batch is non-empty
                batch.first().map(SeriesValue::time).unwrap_or(Time::MIN)
            });
            summary.max_time = batch.last().map(SeriesValue::time);

            if tx.send((flush_index, batch)).is_err() {
                // all workers bailed out; the failure slot has the cause
                break;
            }

            flush_index += 1;
        }

        drop(tx);

        Ok(())
    })?;

    if let Some(e) = failure.into_inner() {
        return Err(e);
    }

    let reorder = reorder.into_inner();

    if !reorder.pending.is_empty() {
        return Err(crate::Error::InvariantViolation(format!(
            "chunk metadata of segment {seg} was not published contiguously",
        )));
    }

    Ok(summary)
}
