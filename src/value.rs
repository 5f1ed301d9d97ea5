// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    chunk::RecordFormat,
    coding::{DecodeError, EncodeError},
    Time,
};
use std::io::{Read, Write};

/// A value stored in a series
///
/// The implementer supplies the codec and the time extraction; the engine
/// never inspects the payload beyond these.
///
/// Values carry a time point and an end time point (for instantaneous
/// values both are the same, which is the default).
pub trait SeriesValue: Clone + Send + Sync + 'static {
    /// The time point of this value.
    fn time(&self) -> Time;

    /// The end time point of this value.
    ///
    /// Must be >= [`SeriesValue::time`].
    fn end_time(&self) -> Time {
        self.time()
    }

    /// Serializes this value into the writer.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Deserializes a value from the reader.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;

    /// Serialized size in bytes, if every value of this type encodes to
    /// the same length
    ///
    /// Returning `Some(n)` selects the fixed record framing for chunk
    /// files; `None` selects the length-prefixed framing.
    #[must_use]
    fn fixed_length() -> Option<usize> {
        None
    }

    /// Serializes this value into a vector.
    fn encode_into_vec(&self) -> Result<Vec<u8>, EncodeError> {
        let mut v = vec![];
        self.encode_into(&mut v)?;
        Ok(v)
    }

    /// Deserializes a value from a byte slice.
    fn decode_from_slice(mut bytes: &[u8]) -> Result<Self, DecodeError>
    where
        Self: Sized,
    {
        Self::decode_from(&mut bytes)
    }
}

/// Returns the chunk record framing for a value type.
#[must_use]
pub fn record_format<V: SeriesValue>() -> RecordFormat {
    match V::fixed_length() {
        Some(len) => RecordFormat::Fixed(len),
        None => RecordFormat::Dynamic,
    }
}
