// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Compression algorithm to use for chunk files
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub enum CompressionType {
    /// No compression
    None,

    /// LZ4 compression
    ///
    /// Recommended for use cases with a focus
    /// on speed over compression ratio.
    #[cfg(feature = "lz4")]
    Lz4,
}

impl CompressionType {
    /// Compresses a block of bytes.
    #[must_use]
    pub fn compress(&self, bytes: &[u8]) -> Vec<u8> {
        match self {
            Self::None => bytes.to_vec(),

            #[cfg(feature = "lz4")]
            Self::Lz4 => lz4_flex::compress_prepend_size(bytes),
        }
    }

    /// Decompresses a block of bytes.
    pub fn decompress(&self, bytes: &[u8]) -> crate::Result<Vec<u8>> {
        match self {
            Self::None => Ok(bytes.to_vec()),

            #[cfg(feature = "lz4")]
            Self::Lz4 => lz4_flex::decompress_size_prepended(bytes)
                .map_err(|_| crate::Error::Decompress(*self)),
        }
    }
}

impl std::fmt::Display for CompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::None => "no compression",

                #[cfg(feature = "lz4")]
                Self::Lz4 => "lz4",
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn compression_none_roundtrip() -> crate::Result<()> {
        let data = b"hello world".repeat(100);
        let compressed = CompressionType::None.compress(&data);
        assert_eq!(data, CompressionType::None.decompress(&compressed)?);
        Ok(())
    }

    #[cfg(feature = "lz4")]
    mod lz4 {
        use super::*;
        use test_log::test;

        #[test]
        fn compression_lz4_roundtrip() -> crate::Result<()> {
            let data = b"hello world".repeat(100);
            let compressed = CompressionType::Lz4.compress(&data);
            assert!(compressed.len() < data.len());
            assert_eq!(data, CompressionType::Lz4.decompress(&compressed)?);
            Ok(())
        }

        #[test]
        fn compression_lz4_rejects_garbage() {
            assert!(matches!(
                CompressionType::Lz4.decompress(&[0xFF; 3]),
                Err(crate::Error::Decompress(CompressionType::Lz4)),
            ));
        }
    }
}
