// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crossbeam_skiplist::SkipMap;
use std::sync::Arc;

/// A row of an ordered table: (range key, value)
pub type TableRow = (Vec<u8>, Vec<u8>);

/// Contract for the external sorted key/range store
///
/// Rows are keyed by (hash key, range key); range keys are opaque bytes
/// ordered bytewise. The engine keeps segment status rows, chunk metadata
/// and lookup memos in tables of this shape.
///
/// Implementations must be safe for concurrent use; the engine layers its
/// own per-segment locking on top for compound operations.
pub trait OrderedTable: Send + Sync {
    /// Returns the value of the row (hash_key, range_key), if any.
    fn get(&self, hash_key: &str, range_key: &[u8]) -> crate::Result<Option<Vec<u8>>>;

    /// Inserts or replaces the row (hash_key, range_key).
    fn put(&self, hash_key: &str, range_key: &[u8], value: Vec<u8>) -> crate::Result<()>;

    /// Deletes the row (hash_key, range_key), if it exists.
    fn delete(&self, hash_key: &str, range_key: &[u8]) -> crate::Result<()>;

    /// Returns the row with the greatest range key <= `range_key`.
    fn seek_floor(&self, hash_key: &str, range_key: &[u8]) -> crate::Result<Option<TableRow>>;

    /// Returns all rows of `hash_key` with range key in [lo, hi],
    /// ascending. `None` bounds are unbounded.
    fn scan(
        &self,
        hash_key: &str,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> crate::Result<Vec<TableRow>>;

    /// Deletes all rows of `hash_key` with range key in [lo, hi].
    fn delete_range(
        &self,
        hash_key: &str,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> crate::Result<()>;
}

/// In-memory [`OrderedTable`] over a lock-free skiplist
///
/// The reference implementation used for embedding and tests; durable
/// deployments plug in a disk-backed sorted store instead.
#[derive(Clone, Default)]
pub struct MemoryTable {
    items: Arc<SkipMap<(String, Vec<u8>), Vec<u8>>>,
}

impl MemoryTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows over all hash keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl OrderedTable for MemoryTable {
    fn get(&self, hash_key: &str, range_key: &[u8]) -> crate::Result<Option<Vec<u8>>> {
        Ok(self
            .items
            .get(&(hash_key.to_owned(), range_key.to_vec()))
            .map(|entry| entry.value().clone()))
    }

    fn put(&self, hash_key: &str, range_key: &[u8], value: Vec<u8>) -> crate::Result<()> {
        self.items
            .insert((hash_key.to_owned(), range_key.to_vec()), value);
        Ok(())
    }

    fn delete(&self, hash_key: &str, range_key: &[u8]) -> crate::Result<()> {
        self.items
            .remove(&(hash_key.to_owned(), range_key.to_vec()));
        Ok(())
    }

    fn seek_floor(&self, hash_key: &str, range_key: &[u8]) -> crate::Result<Option<TableRow>> {
        let start = (hash_key.to_owned(), Vec::new());
        let end = (hash_key.to_owned(), range_key.to_vec());

        Ok(self
            .items
            .range(start..=end)
            .next_back()
            .map(|entry| (entry.key().1.clone(), entry.value().clone())))
    }

    fn scan(
        &self,
        hash_key: &str,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> crate::Result<Vec<TableRow>> {
        let start = (
            hash_key.to_owned(),
            lo.map(<[u8]>::to_vec).unwrap_or_default(),
        );

        Ok(self
            .items
            .range(start..)
            .take_while(|entry| entry.key().0 == hash_key)
            .filter(|entry| hi.is_none_or(|hi| entry.key().1.as_slice() <= hi))
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect())
    }

    fn delete_range(
        &self,
        hash_key: &str,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> crate::Result<()> {
        let doomed = self.scan(hash_key, lo, hi)?;

        for (range_key, _) in doomed {
            self.items.remove(&(hash_key.to_owned(), range_key));
        }

        Ok(())
    }
}

/// The set of persistent tables backing one store
#[derive(Clone)]
pub struct Tables {
    /// Segment status rows: (hash key, segment range) -> status
    pub status: Arc<dyn OrderedTable>,

    /// Chunk metadata rows: (segmented hash key, (first time, flush index)) -> meta
    pub chunks: Arc<dyn OrderedTable>,

    /// Latest-value memo rows: (hash key, query time) -> value or null
    pub latest: Arc<dyn OrderedTable>,

    /// Previous-value memo rows: (hash key, (query time, shift)) -> value or null
    pub previous: Arc<dyn OrderedTable>,

    /// Next-value memo rows: (hash key, (query time, shift)) -> value or null
    pub next: Arc<dyn OrderedTable>,
}

impl Tables {
    /// Creates a set of in-memory tables.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            status: Arc::new(MemoryTable::new()),
            chunks: Arc::new(MemoryTable::new()),
            latest: Arc::new(MemoryTable::new()),
            previous: Arc::new(MemoryTable::new()),
            next: Arc::new(MemoryTable::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn memory_table_scan_is_ordered() -> crate::Result<()> {
        let table = MemoryTable::new();

        table.put("a", &[3], vec![3])?;
        table.put("a", &[1], vec![1])?;
        table.put("a", &[2], vec![2])?;
        table.put("b", &[0], vec![0])?;

        let rows = table.scan("a", None, None)?;
        assert_eq!(
            vec![vec![1u8], vec![2], vec![3]],
            rows.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
        );

        let rows = table.scan("a", Some(&[2]), Some(&[3]))?;
        assert_eq!(2, rows.len());

        Ok(())
    }

    #[test]
    fn memory_table_seek_floor() -> crate::Result<()> {
        let table = MemoryTable::new();

        table.put("a", &[10], vec![10])?;
        table.put("a", &[20], vec![20])?;

        assert_eq!(Some((vec![10u8], vec![10u8])), table.seek_floor("a", &[15])?);
        assert_eq!(Some((vec![20u8], vec![20u8])), table.seek_floor("a", &[20])?);
        assert_eq!(None, table.seek_floor("a", &[9])?);

        Ok(())
    }

    #[test]
    fn memory_table_delete_range_is_scoped() -> crate::Result<()> {
        let table = MemoryTable::new();

        table.put("a", &[1], vec![])?;
        table.put("a", &[2], vec![])?;
        table.put("b", &[1], vec![])?;

        table.delete_range("a", None, None)?;

        assert!(table.scan("a", None, None)?.is_empty());
        assert_eq!(1, table.scan("b", None, None)?.len());

        Ok(())
    }
}
