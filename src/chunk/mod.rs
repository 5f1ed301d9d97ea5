// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub(crate) mod iter;

pub use iter::{ChunkReader, ReverseChunkReader};

use crate::CompressionType;
use byteorder::{BigEndian, WriteBytesExt};
use parking_lot::Mutex;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// Record framing inside a chunk file
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordFormat {
    /// Each record is a 4-byte big-endian length followed by that many
    /// payload bytes
    Dynamic,

    /// Each record is exactly this many bytes, no header
    Fixed(usize),
}

struct Inner {
    /// Write handle, created lazily on the first add
    file: Option<BufWriter<File>>,

    /// Records buffered since the last flush
    buf: Vec<u8>,

    /// Bytes visible on disk to concurrent readers
    ///
    /// `u64::MAX` is the read-only sentinel: iterate until EOF.
    flushed_len: u64,

    closed: bool,
    read_only: bool,
}

/// A single-file append-only container of serialized records,
/// block-compressed end-to-end
///
/// Records are buffered in memory and published as one compressed block
/// per [`ChunkFile::flush`]. Readers only ever observe fully flushed
/// blocks, so a concurrent iterator sees a record-aligned prefix.
pub struct ChunkFile {
    path: PathBuf,
    format: RecordFormat,
    compression: CompressionType,
    inner: Mutex<Inner>,
}

impl ChunkFile {
    /// Sets up a writable chunk file at the given path.
    ///
    /// The file itself is created on the first [`ChunkFile::add`].
    #[must_use]
    pub fn create(path: impl Into<PathBuf>, format: RecordFormat, compression: CompressionType) -> Self {
        Self {
            path: path.into(),
            format,
            compression,
            inner: Mutex::new(Inner {
                file: None,
                buf: Vec::new(),
                flushed_len: 0,
                closed: false,
                read_only: false,
            }),
        }
    }

    /// Opens an existing chunk file for reading only.
    #[must_use]
    pub fn open_read_only(
        path: impl Into<PathBuf>,
        format: RecordFormat,
        compression: CompressionType,
    ) -> Self {
        Self {
            path: path.into(),
            format,
            compression,
            inner: Mutex::new(Inner {
                file: None,
                buf: Vec::new(),
                flushed_len: u64::MAX,
                closed: true,
                read_only: true,
            }),
        }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record.
    ///
    /// The record stays invisible to readers until the next flush.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::EmptyRecord`] for a zero-length payload,
    /// [`crate::Error::RecordLengthMismatch`] if the payload does not
    /// match a fixed framing, [`crate::Error::ReadOnly`] /
    /// [`crate::Error::Closed`] when the file cannot be written.
    pub fn add(&self, payload: &[u8]) -> crate::Result<()> {
        let mut inner = self.inner.lock();

        if inner.read_only {
            return Err(crate::Error::ReadOnly);
        }
        if inner.closed {
            return Err(crate::Error::Closed);
        }
        if payload.is_empty() {
            return Err(crate::Error::EmptyRecord);
        }

        match self.format {
            RecordFormat::Dynamic => {
                // NOTE: cannot fail, destination is a Vec
                #[allow(clippy::expect_used)]
                inner
                    .buf
                    .write_u32::<BigEndian>(payload.len() as u32)
                    .expect("buffer write cannot fail");
            }
            RecordFormat::Fixed(len) => {
                if payload.len() != len {
                    return Err(crate::Error::RecordLengthMismatch(len, payload.len()));
                }
            }
        }

        inner.buf.extend_from_slice(payload);

        if inner.file.is_none() {
            let file = File::create(&self.path)?;
            inner.file = Some(BufWriter::with_capacity(u16::MAX.into(), file));
        }

        Ok(())
    }

    /// Publishes all buffered records as one compressed block, making
    /// them visible to concurrent readers.
    pub fn flush(&self) -> crate::Result<()> {
        let mut inner = self.inner.lock();

        if inner.read_only {
            return Err(crate::Error::ReadOnly);
        }

        self.flush_locked(&mut inner)
    }

    fn flush_locked(&self, inner: &mut Inner) -> crate::Result<()> {
        if inner.buf.is_empty() {
            if let Some(file) = &mut inner.file {
                file.flush()?;
            }
            return Ok(());
        }

        let block = self.compression.compress(&inner.buf);

        let Some(file) = &mut inner.file else {
            // add() creates the handle before buffering
            return Err(crate::Error::Closed);
        };

        file.write_u32::<BigEndian>(block.len() as u32)?;
        file.write_all(&block)?;
        file.flush()?;

        inner.flushed_len += 4 + block.len() as u64;
        inner.buf.clear();

        Ok(())
    }

    /// Flushes and permanently forbids further writes.
    pub fn close(&self) -> crate::Result<()> {
        let mut inner = self.inner.lock();

        if inner.read_only || inner.closed {
            return Ok(());
        }

        self.flush_locked(&mut inner)?;

        if let Some(file) = inner.file.take() {
            file.into_inner().map_err(std::io::IntoInnerError::into_error)?.sync_all()?;
        }

        inner.closed = true;

        Ok(())
    }

    /// Bytes currently visible to readers.
    #[must_use]
    pub fn flushed_len(&self) -> u64 {
        self.inner.lock().flushed_len
    }

    /// Creates a forward single-pass iterator over all currently visible
    /// records.
    pub fn iter(&self) -> crate::Result<ChunkReader> {
        let bound = self.inner.lock().flushed_len;
        ChunkReader::new(&self.path, self.format, self.compression, bound)
    }

    /// Creates a reverse iterator over all currently visible records.
    ///
    /// Buffers the forward iteration, so this is O(n) in memory.
    pub fn iter_rev(&self) -> crate::Result<ReverseChunkReader> {
        Ok(ReverseChunkReader::new(self.iter()?))
    }
}
