// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{DecodeError, EncodeError},
    CompressionType,
};

/// Represents errors that can occur in the series store
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Serialization failed
    Encode(EncodeError),

    /// Deserialization failed
    Decode(DecodeError),

    /// Decompression failed
    Decompress(CompressionType),

    /// A data invariant was broken (non-monotonic times, availability
    /// bounds exceeded, empty segment after initialization)
    InvariantViolation(String),

    /// The bounded write-lock acquisition expired
    ///
    /// The operation should be retried later.
    LockTimeout,

    /// A previous update did not run to completion; the segment must be
    /// purged and rebuilt
    ///
    /// The operation should be retried later.
    IncompleteUpdate,

    /// Shift distance for previous/next lookups must be >= 1
    InvalidShift(usize),

    /// Tried to write a zero-length record
    EmptyRecord,

    /// Record length does not match the fixed record format (expected, got)
    RecordLengthMismatch(usize, usize),

    /// Tried to write to a file that was opened read-only
    ReadOnly,

    /// Tried to write to a file that was already closed
    Closed,

    /// A chunk file with this path already exists
    DuplicateFile(String),
}

impl Error {
    /// Returns `true` if the operation that produced this error may
    /// succeed when retried later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout | Self::IncompleteUpdate)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SeriesStoreError: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Series store result
pub type Result<T> = std::result::Result<T, Error>;
