// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{
    lock::{LockRegistry, SegmentLock},
    SegmentedKey,
};
use crate::{
    chunk::{ChunkFile, RecordFormat},
    coding::{Decode, Encode},
    meta::ChunkMeta,
    table::OrderedTable,
    value::record_format,
    CompressionType, SeriesValue, Time,
};
use std::{marker::PhantomData, path::PathBuf, sync::Arc};

/// Name of the crash marker inside a segment folder
pub const UPDATE_LOCK_FILE: &str = "update.lock";

/// Chunk files and chunk metadata of all segments of one series
///
/// Metadata rows live in the chunk table keyed by the segmented hash key;
/// chunk files live in one folder per segment. Also owns the per-segment
/// lock objects.
pub struct SegmentTable<V: SeriesValue> {
    folder: PathBuf,
    chunks: Arc<dyn OrderedTable>,
    locks: LockRegistry,
    compression: CompressionType,
    _marker: PhantomData<V>,
}

impl<V: SeriesValue> SegmentTable<V> {
    pub fn new(folder: PathBuf, chunks: Arc<dyn OrderedTable>, compression: CompressionType) -> Self {
        Self {
            folder,
            chunks,
            locks: LockRegistry::new(),
            compression,
            _marker: PhantomData,
        }
    }

    pub fn lock(&self, seg: &SegmentedKey) -> Arc<SegmentLock> {
        self.locks.lock_for(seg)
    }

    pub fn segment_folder(&self, seg: &SegmentedKey) -> PathBuf {
        self.folder.join(seg.segmented_hash_key())
    }

    pub fn update_lock_path(&self, seg: &SegmentedKey) -> PathBuf {
        self.segment_folder(seg).join(UPDATE_LOCK_FILE)
    }

    fn format(&self) -> RecordFormat {
        record_format::<V>()
    }

    fn decode_value(bytes: &[u8]) -> crate::Result<V> {
        V::decode_from_slice(bytes).map_err(crate::Error::Decode)
    }

    /// All chunk metadata rows of the segment, ordered by (first time,
    /// flush index).
    pub fn chunk_metas(&self, seg: &SegmentedKey) -> crate::Result<Vec<ChunkMeta>> {
        let rows = self
            .chunks
            .scan(&seg.segmented_hash_key(), None, None)?;

        let mut metas = Vec::with_capacity(rows.len());

        for (_, value) in rows {
            metas.push(ChunkMeta::decode_from(&mut &value[..]).map_err(crate::Error::Decode)?);
        }

        Ok(metas)
    }

    /// Index to assign to the next flushed chunk.
    pub fn next_flush_index(&self, seg: &SegmentedKey) -> crate::Result<u64> {
        Ok(self
            .chunk_metas(seg)?
            .iter()
            .map(|meta| meta.flush_index + 1)
            .max()
            .unwrap_or_default())
    }

    /// Sets up the writer for a new chunk file.
    pub fn new_file(&self, seg: &SegmentedKey, flush_index: u64) -> crate::Result<ChunkFile> {
        let folder = self.segment_folder(seg);
        std::fs::create_dir_all(&folder)?;

        let path = folder.join(flush_index.to_string());

        if path.try_exists()? {
            return Err(crate::Error::DuplicateFile(
                path.to_string_lossy().into_owned(),
            ));
        }

        Ok(ChunkFile::create(path, self.format(), self.compression))
    }

    /// Publishes the metadata row of a finished chunk file.
    pub fn finish_file(&self, seg: &SegmentedKey, meta: &ChunkMeta) -> crate::Result<()> {
        log::trace!(
            "finished chunk {} [{}<=>{}] of {seg}",
            meta.flush_index,
            meta.first_time,
            meta.last_time,
        );

        self.chunks.put(
            &seg.segmented_hash_key(),
            &meta.key(),
            meta.encode_into_vec(),
        )
    }

    fn chunks_intersecting(
        &self,
        seg: &SegmentedKey,
        from: Time,
        to: Time,
    ) -> crate::Result<Vec<ChunkMeta>> {
        let hi = ChunkMeta::range_key(to, u64::MAX);
        let rows = self
            .chunks
            .scan(&seg.segmented_hash_key(), None, Some(&hi))?;

        let mut metas = Vec::with_capacity(rows.len());

        for (_, value) in rows {
            let meta = ChunkMeta::decode_from(&mut &value[..]).map_err(crate::Error::Decode)?;

            if meta.last_time >= from {
                metas.push(meta);
            }
        }

        Ok(metas)
    }

    /// Ordered stream of all values of the segment with time in
    /// [from, to].
    pub fn range_values(
        &self,
        seg: &SegmentedKey,
        from: Time,
        to: Time,
    ) -> crate::Result<SegmentValues<V>> {
        let metas = self.chunks_intersecting(seg, from, to)?;
        Ok(SegmentValues::new(
            metas,
            from,
            to,
            false,
            self.format(),
            self.compression,
        ))
    }

    /// Like [`SegmentTable::range_values`], in descending time order.
    pub fn range_values_rev(
        &self,
        seg: &SegmentedKey,
        from: Time,
        to: Time,
    ) -> crate::Result<SegmentValues<V>> {
        let mut metas = self.chunks_intersecting(seg, from, to)?;
        metas.reverse();
        Ok(SegmentValues::new(
            metas,
            from,
            to,
            true,
            self.format(),
            self.compression,
        ))
    }

    /// The value with the greatest time <= `t`, if the segment has one.
    ///
    /// Seeks the greatest chunk whose first time is <= `t`, then scans it
    /// forward keeping the last matching record, so equal times resolve
    /// to the latest inserted value.
    pub fn latest_value(&self, seg: &SegmentedKey, t: Time) -> crate::Result<Option<V>> {
        let key = ChunkMeta::range_key(t, u64::MAX);

        let Some((_, value)) = self.chunks.seek_floor(&seg.segmented_hash_key(), &key)? else {
            return Ok(None);
        };

        let meta = ChunkMeta::decode_from(&mut &value[..]).map_err(crate::Error::Decode)?;
        let file = ChunkFile::open_read_only(&meta.path, self.format(), self.compression);

        let mut candidate = None;

        for payload in file.iter()? {
            let v = Self::decode_value(&payload?)?;

            if v.time() <= t {
                candidate = Some(v);
            } else {
                break;
            }
        }

        Ok(candidate)
    }

    /// Decoded first value of the segment, from the first chunk's
    /// metadata.
    pub fn first_value(&self, seg: &SegmentedKey) -> crate::Result<Option<V>> {
        let metas = self.chunk_metas(seg)?;

        metas
            .first()
            .map(|meta| Self::decode_value(&meta.first_value))
            .transpose()
    }

    /// Decoded last value of the segment, from the last chunk's
    /// metadata.
    pub fn last_value(&self, seg: &SegmentedKey) -> crate::Result<Option<V>> {
        let metas = self.chunk_metas(seg)?;

        metas
            .last()
            .map(|meta| Self::decode_value(&meta.last_value))
            .transpose()
    }

    /// Removes all chunk files and metadata rows of the segment,
    /// including a leftover crash marker.
    pub fn delete_range(&self, seg: &SegmentedKey) -> crate::Result<()> {
        log::debug!("purging segment {seg}");

        self.chunks
            .delete_range(&seg.segmented_hash_key(), None, None)?;

        match std::fs::remove_dir_all(self.segment_folder(seg)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns `true` if the segment has no chunks, or any declared chunk
    /// file is missing, unreadable or empty.
    pub fn is_empty_or_inconsistent(&self, seg: &SegmentedKey) -> crate::Result<bool> {
        let metas = self.chunk_metas(seg)?;

        if metas.is_empty() {
            return Ok(true);
        }

        for meta in metas {
            if !std::path::Path::new(&meta.path).try_exists()? {
                log::warn!("chunk file {} of {seg} is missing", meta.path);
                return Ok(true);
            }

            let file = ChunkFile::open_read_only(&meta.path, self.format(), self.compression);

            match file.iter()?.next() {
                Some(Ok(_)) => {}
                Some(Err(_)) | None => {
                    log::warn!("chunk file {} of {seg} is unreadable or empty", meta.path);
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}

/// Ordered, clipped stream of one segment's values across its chunks
///
/// Chunks are opened lazily one at a time; per record, the extracted time
/// decides whether it is skipped (before the window), yielded, or ends
/// the stream (past the window).
pub struct SegmentValues<V: SeriesValue> {
    metas: std::vec::IntoIter<ChunkMeta>,
    current: Option<Box<dyn Iterator<Item = crate::Result<Vec<u8>>> + Send>>,
    from: Time,
    to: Time,
    reverse: bool,
    format: RecordFormat,
    compression: CompressionType,
    done: bool,
    _marker: PhantomData<V>,
}

impl<V: SeriesValue> SegmentValues<V> {
    fn new(
        metas: Vec<ChunkMeta>,
        from: Time,
        to: Time,
        reverse: bool,
        format: RecordFormat,
        compression: CompressionType,
    ) -> Self {
        Self {
            metas: metas.into_iter(),
            current: None,
            from,
            to,
            reverse,
            format,
            compression,
            done: false,
            _marker: PhantomData,
        }
    }

    fn open_next_chunk(&mut self) -> crate::Result<bool> {
        let Some(meta) = self.metas.next() else {
            return Ok(false);
        };

        let file = ChunkFile::open_read_only(&meta.path, self.format, self.compression);

        self.current = Some(if self.reverse {
            Box::new(file.iter_rev()?)
        } else {
            Box::new(file.iter()?)
        });

        Ok(true)
    }
}

impl<V: SeriesValue> Iterator for SegmentValues<V> {
    type Item = crate::Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if let Some(reader) = &mut self.current {
                for payload in reader.by_ref() {
                    let payload = match payload {
                        Ok(payload) => payload,
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    };

                    let value = match V::decode_from_slice(&payload) {
                        Ok(value) => value,
                        Err(e) => {
                            self.done = true;
                            return Some(Err(crate::Error::Decode(e)));
                        }
                    };

                    let t = value.time();

                    if self.reverse {
                        if t > self.to {
                            continue;
                        }
                        if t < self.from {
                            self.done = true;
                            return None;
                        }
                    } else {
                        if t < self.from {
                            continue;
                        }
                        if t > self.to {
                            self.done = true;
                            return None;
                        }
                    }

                    return Some(Ok(value));
                }

                self.current = None;
            }

            match self.open_next_chunk() {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
