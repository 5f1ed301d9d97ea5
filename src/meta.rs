// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{Decode, DecodeError, Encode, EncodeError},
    Time,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Metadata of one flushed chunk file
///
/// One row per chunk in the chunk table, keyed by (first time, flush
/// index). The boundary values are stored serialized so first/last
/// lookups do not have to open the file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChunkMeta {
    /// Chunk file path
    pub path: String,

    /// Monotonic index assigned when the chunk was flushed
    pub flush_index: u64,

    /// Time of the first record
    pub first_time: Time,

    /// Time of the last record
    pub last_time: Time,

    /// Serialized first record
    pub first_value: Vec<u8>,

    /// Serialized last record
    pub last_value: Vec<u8>,
}

impl ChunkMeta {
    /// Order-preserving table range key: first time, then flush index.
    #[must_use]
    pub fn range_key(first_time: Time, flush_index: u64) -> [u8; 16] {
        let mut key = [0; 16];
        key[..8].copy_from_slice(&first_time.to_key());
        key[8..].copy_from_slice(&flush_index.to_be_bytes());
        key
    }

    /// The range key of this chunk.
    #[must_use]
    pub fn key(&self) -> [u8; 16] {
        Self::range_key(self.first_time, self.flush_index)
    }
}

fn write_bytes<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<(), EncodeError> {
    writer.write_u32::<BigEndian>(bytes.len() as u32)?;
    writer.write_all(bytes)?;
    Ok(())
}

fn read_bytes<R: Read>(reader: &mut R) -> Result<Vec<u8>, DecodeError> {
    let len = reader.read_u32::<BigEndian>()? as usize;
    let mut buf = vec![0; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

impl Encode for ChunkMeta {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        write_bytes(writer, self.path.as_bytes())?;
        writer.write_u64::<BigEndian>(self.flush_index)?;
        self.first_time.encode_into(writer)?;
        self.last_time.encode_into(writer)?;
        write_bytes(writer, &self.first_value)?;
        write_bytes(writer, &self.last_value)?;
        Ok(())
    }
}

impl Decode for ChunkMeta {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let path = String::from_utf8(read_bytes(reader)?).map_err(|_| DecodeError::InvalidUtf8)?;
        let flush_index = reader.read_u64::<BigEndian>()?;
        let first_time = Time::decode_from(reader)?;
        let last_time = Time::decode_from(reader)?;
        let first_value = read_bytes(reader)?;
        let last_value = read_bytes(reader)?;

        Ok(Self {
            path,
            flush_index,
            first_time,
            last_time,
            first_value,
            last_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn chunk_meta_roundtrip() -> crate::Result<()> {
        let meta = ChunkMeta {
            path: "series/seg/0".to_owned(),
            flush_index: 3,
            first_time: Time::new(100),
            last_time: Time::new(200),
            first_value: vec![1, 2, 3],
            last_value: vec![4, 5],
        };

        let bytes = meta.encode_into_vec();
        assert_eq!(meta, ChunkMeta::decode_from(&mut &bytes[..])?);

        Ok(())
    }

    #[test]
    fn chunk_meta_key_orders_by_time_then_index() {
        let a = ChunkMeta::range_key(Time::new(1), 5);
        let b = ChunkMeta::range_key(Time::new(1), 6);
        let c = ChunkMeta::range_key(Time::new(2), 0);

        assert!(a < b);
        assert!(b < c);
    }
}
