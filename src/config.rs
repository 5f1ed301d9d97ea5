// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    live::{LiveSeriesStore, PromotedBounds, PromotedSource},
    retry::RetryPolicy,
    segment::{status::StatusStore, table::SegmentTable},
    store::SeriesStore,
    table::Tables,
    update::UpdateOptions,
    CompressionType, EvictionMode, SegmentFinder, SeriesSource, SeriesValue,
};
use std::{
    marker::PhantomData,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

/// Store configuration builder
#[derive(Clone)]
pub struct Config {
    /// Folder for the chunk files
    path: PathBuf,

    /// Stable series identity
    hash_key: String,

    /// Backing ordered tables
    tables: Tables,

    /// Compression of the chunk files
    compression: CompressionType,

    /// Entry bound of each in-memory lookup cache
    cache_capacity: usize,

    /// Overflow behavior of the in-memory lookup caches
    eviction: EvictionMode,

    /// Retry behavior of segment initialization
    retry: RetryPolicy,

    /// Segment writer knobs
    update: UpdateOptions,

    /// Budget for write lock acquisition
    lock_timeout: Duration,
}

impl Config {
    /// Creates a config backed by in-memory tables, writing chunk files
    /// into the given folder.
    pub fn new(path: impl Into<PathBuf>, hash_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            hash_key: hash_key.into(),
            tables: Tables::in_memory(),
            compression: CompressionType::None,
            cache_capacity: 1_000,
            eviction: EvictionMode::default(),
            retry: RetryPolicy::default(),
            update: UpdateOptions::default(),
            lock_timeout: Duration::from_secs(60),
        }
    }

    /// Plugs in durable ordered tables.
    #[must_use]
    pub fn use_tables(mut self, tables: Tables) -> Self {
        self.tables = tables;
        self
    }

    /// Sets the chunk file compression.
    #[must_use]
    pub fn use_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the entry bound of each in-memory lookup cache.
    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Sets the overflow behavior of the in-memory lookup caches.
    #[must_use]
    pub fn eviction_mode(mut self, mode: EvictionMode) -> Self {
        self.eviction = mode;
        self
    }

    /// Sets the retry behavior of segment initialization.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Sets the segment writer knobs.
    #[must_use]
    pub fn update_options(mut self, options: UpdateOptions) -> Self {
        self.update = options;
        self
    }

    /// Sets the budget for write lock acquisition.
    #[must_use]
    pub fn lock_timeout(mut self, budget: Duration) -> Self {
        self.lock_timeout = budget;
        self
    }

    /// Opens a historical store pulling segments from the given source.
    pub fn open<V: SeriesValue>(
        self,
        source: Arc<dyn SeriesSource<V>>,
        finder: Arc<dyn SegmentFinder>,
    ) -> crate::Result<SeriesStore<V>> {
        std::fs::create_dir_all(&self.path)?;

        let table = SegmentTable::new(self.path, Arc::clone(&self.tables.chunks), self.compression);
        let status = StatusStore::new(Arc::clone(&self.tables.status));

        Ok(SeriesStore::new(
            Arc::from(self.hash_key),
            source,
            finder,
            table,
            status,
            (
                Arc::clone(&self.tables.latest),
                Arc::clone(&self.tables.previous),
                Arc::clone(&self.tables.next),
            ),
            self.cache_capacity,
            self.eviction,
            self.retry,
            self.update,
            self.lock_timeout,
        ))
    }

    /// Opens a live store whose historical part is fed exclusively by
    /// promotions of the live tail.
    pub fn open_live<V: SeriesValue>(
        self,
        finder: Arc<dyn SegmentFinder>,
    ) -> crate::Result<LiveSeriesStore<V>> {
        let bounds = Arc::new(PromotedBounds::default());

        let source = Arc::new(PromotedSource::<V> {
            bounds: Arc::clone(&bounds),
            _marker: PhantomData,
        });

        let historical = self.open(source, finder)?;

        Ok(LiveSeriesStore::new(historical, bounds))
    }
}
