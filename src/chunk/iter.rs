// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::RecordFormat;
use crate::CompressionType;
use byteorder::{BigEndian, ReadBytesExt};
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

/// Forward single-pass iterator over the records of a chunk file
///
/// Bounded by the flushed length observed at creation (or EOF for
/// read-only files), so a concurrently appending writer never exposes a
/// torn block. A truncated or malformed tail terminates the iteration;
/// real I/O faults are surfaced as `Err` items.
pub struct ChunkReader {
    file: Option<BufReader<File>>,
    format: RecordFormat,
    compression: CompressionType,

    /// Bytes of the file that may be consumed; `u64::MAX` means EOF-bounded
    bound: u64,
    pos: u64,

    block: Vec<u8>,
    block_pos: usize,

    done: bool,
}

impl ChunkReader {
    pub(crate) fn new(
        path: &Path,
        format: RecordFormat,
        compression: CompressionType,
        bound: u64,
    ) -> crate::Result<Self> {
        let file = if bound == 0 {
            None
        } else {
            match File::open(path) {
                Ok(file) => Some(BufReader::with_capacity(8 * 4_096, file)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            }
        };

        Ok(Self {
            file,
            format,
            compression,
            bound,
            pos: 0,
            block: Vec::new(),
            block_pos: 0,
            done: false,
        })
    }

    /// Takes the next record out of the current block, if one is fully
    /// contained in it.
    fn next_in_block(&mut self) -> Option<Vec<u8>> {
        let remaining = &self.block[self.block_pos..];

        if remaining.is_empty() {
            return None;
        }

        let (start, len) = match self.format {
            RecordFormat::Dynamic => {
                if remaining.len() < 4 {
                    // malformed tail, records never span blocks
                    self.done = true;
                    return None;
                }

                let len =
                    u32::from_be_bytes([remaining[0], remaining[1], remaining[2], remaining[3]])
                        as usize;
                (4, len)
            }
            RecordFormat::Fixed(len) => (0, len),
        };

        if len == 0 || remaining.len() < start + len {
            self.done = true;
            return None;
        }

        let payload = remaining[start..start + len].to_vec();
        self.block_pos += start + len;

        Some(payload)
    }

    /// Reads and decompresses the next visible block. Returns `false` on
    /// (possibly truncated) EOF.
    fn fetch_next_block(&mut self) -> crate::Result<bool> {
        let Some(file) = &mut self.file else {
            return Ok(false);
        };

        if self.bound != u64::MAX && self.pos + 4 > self.bound {
            return Ok(false);
        }

        let block_len = match file.read_u32::<BigEndian>() {
            Ok(len) => u64::from(len),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if self.bound != u64::MAX && self.pos + 4 + block_len > self.bound {
            return Ok(false);
        }

        let mut compressed = vec![0; block_len as usize];
        match file.read_exact(&mut compressed) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        match self.compression.decompress(&compressed) {
            Ok(block) => {
                self.pos += 4 + block_len;
                self.block = block;
                self.block_pos = 0;
                Ok(true)
            }
            Err(_) => {
                log::warn!("undecodable block at offset {}, stopping iteration", self.pos);
                Ok(false)
            }
        }
    }
}

impl Iterator for ChunkReader {
    type Item = crate::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if let Some(payload) = self.next_in_block() {
                return Some(Ok(payload));
            }

            if !fail_iter!(self.fetch_next_block()) {
                self.done = true;
                return None;
            }
        }
    }
}

/// Reverse iterator over the records of a chunk file
///
/// Materializes the forward iteration up front, so memory usage is
/// proportional to the visible file contents.
pub struct ReverseChunkReader {
    records: Vec<Vec<u8>>,
    error: Option<crate::Error>,
}

impl ReverseChunkReader {
    pub(crate) fn new(forward: ChunkReader) -> Self {
        let mut records = Vec::new();
        let mut error = None;

        for item in forward {
            match item {
                Ok(payload) => records.push(payload),
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }

        Self { records, error }
    }
}

impl Iterator for ReverseChunkReader {
    type Item = crate::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.error.take() {
            self.records.clear();
            return Some(Err(e));
        }

        self.records.pop().map(Ok)
    }
}
