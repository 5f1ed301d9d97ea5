// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An embedded, append-only segmented storage engine for keyed
//! time-series streams.
//!
//! ##### About
//!
//! A series is an ordered stream of time-stamped values. The engine
//! partitions each series into **segments** (contiguous, non-overlapping
//! time ranges produced by a [`SegmentFinder`]); a segment is
//! materialized lazily on first access by pulling its elements from a
//! user-supplied [`SeriesSource`], then written as compressed, chunked
//! files. Queries (range scans in both directions, latest/previous/next
//! lookups, first/last values) transparently span all segments they
//! touch.
//!
//! Crash consistency comes from a per-segment status row plus an
//! on-disk update marker: a segment observed mid-initialization is
//! purged and rebuilt from the source on the next access.
//!
//! An optional live store ([`LiveSeriesStore`]) keeps the newest segment
//! in memory, merges it into queries, and promotes it to a historical
//! segment once a value beyond its range arrives.
//!
//! # Example usage
//!
//! ```
//! use segmented_series::{
//!     Config, DecodeError, EncodeError, FixedWindowFinder, SeriesSource,
//!     SeriesValue, Time, TimeRange,
//! };
//! use std::io::{Read, Write};
//! use std::sync::Arc;
//!
//! #[derive(Clone)]
//! struct Tick(i64);
//!
//! impl SeriesValue for Tick {
//!     fn time(&self) -> Time {
//!         Time::new(self.0)
//!     }
//!
//!     fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
//!         writer.write_all(&self.0.to_be_bytes())?;
//!         Ok(())
//!     }
//!
//!     fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
//!         let mut buf = [0; 8];
//!         reader.read_exact(&mut buf)?;
//!         Ok(Self(i64::from_be_bytes(buf)))
//!     }
//! }
//!
//! // one tick per time point in [0, 99]
//! struct Source;
//!
//! impl SeriesSource<Tick> for Source {
//!     fn download_segment_elements(
//!         &self,
//!         range: &TimeRange,
//!     ) -> segmented_series::Result<Box<dyn Iterator<Item = Tick> + Send + '_>> {
//!         let to = range.to().ticks().min(99);
//!         Ok(Box::new((range.from().ticks()..=to).map(Tick)))
//!     }
//!
//!     fn first_available_from(&self) -> Option<Time> {
//!         Some(Time::new(0))
//!     }
//!
//!     fn last_available_to(&self) -> Option<Time> {
//!         Some(Time::new(99))
//!     }
//! }
//!
//! # fn main() -> segmented_series::Result<()> {
//! let folder = tempfile::tempdir()?;
//!
//! // tile the series into segments of 10 ticks
//! let store = Config::new(folder.path(), "ticks")
//!     .open(Arc::new(Source), Arc::new(FixedWindowFinder::new(10)))?;
//!
//! // reads the two segments [20, 29] and [30, 39] from the source,
//! // persists them, and streams the clipped window
//! let values: Vec<Tick> = store
//!     .read_range_values(Time::new(25), Time::new(34))
//!     .collect::<segmented_series::Result<_>>()?;
//! assert_eq!(10, values.len());
//!
//! let latest = store.get_latest_value(Time::new(42))?;
//! assert_eq!(42, latest.expect("should exist").0);
//! #
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

macro_rules! fail_iter {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        }
    };
}

mod chunk;
mod coding;
mod compression;
mod config;
mod error;
mod finder;
mod live;
mod lookup;
mod meta;
mod retry;
mod segment;
mod source;
mod store;
mod table;
mod time;
mod time_range;
mod update;
mod value;

pub use chunk::{ChunkFile, ChunkReader, RecordFormat, ReverseChunkReader};
pub use coding::{Decode, DecodeError, Encode, EncodeError};
pub use compression::CompressionType;
pub use config::Config;
pub use error::{Error, Result};
pub use finder::{FixedWindowFinder, SegmentFinder};
pub use live::{LiveRangeValues, LiveSeriesStore};
pub use lookup::EvictionMode;
pub use meta::ChunkMeta;
pub use retry::RetryPolicy;
pub use segment::{SegmentStatus, SegmentedKey};
pub use source::SeriesSource;
pub use store::{RangeValues, SeriesStore};
pub use table::{MemoryTable, OrderedTable, TableRow, Tables};
pub use time::Time;
pub use time_range::TimeRange;
pub use update::{UpdateOptions, UpdateSummary};
pub use value::SeriesValue;
