// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{SegmentStatus, SegmentedKey};
use crate::{coding::DecodeError, table::OrderedTable, TimeRange};
use std::sync::Arc;

/// Persistent map (hash key, segment range) -> [`SegmentStatus`]
#[derive(Clone)]
pub struct StatusStore {
    table: Arc<dyn OrderedTable>,
}

impl StatusStore {
    pub fn new(table: Arc<dyn OrderedTable>) -> Self {
        Self { table }
    }

    pub fn get(&self, seg: &SegmentedKey) -> crate::Result<Option<SegmentStatus>> {
        let Some(value) = self.table.get(&seg.hash_key, &seg.range.to_key())? else {
            return Ok(None);
        };

        let tag = *value
            .first()
            .ok_or(crate::Error::Decode(DecodeError::InvalidLength(0)))?;

        let status = SegmentStatus::try_from(tag)
            .map_err(|()| crate::Error::Decode(DecodeError::InvalidTag(("SegmentStatus", tag))))?;

        Ok(Some(status))
    }

    pub fn put(&self, seg: &SegmentedKey, status: SegmentStatus) -> crate::Result<()> {
        self.table
            .put(&seg.hash_key, &seg.range.to_key(), vec![status.into()])
    }

    pub fn delete(&self, seg: &SegmentedKey) -> crate::Result<()> {
        self.table.delete(&seg.hash_key, &seg.range.to_key())
    }

    /// All status rows of the series, ordered by segment range.
    pub fn scan(&self, hash_key: &str) -> crate::Result<Vec<(TimeRange, SegmentStatus)>> {
        let rows = self.table.scan(hash_key, None, None)?;
        let mut result = Vec::with_capacity(rows.len());

        for (range_key, value) in rows {
            let range = TimeRange::from_key(&range_key).map_err(crate::Error::Decode)?;

            let tag = *value
                .first()
                .ok_or(crate::Error::Decode(DecodeError::InvalidLength(0)))?;

            let status = SegmentStatus::try_from(tag).map_err(|()| {
                crate::Error::Decode(DecodeError::InvalidTag(("SegmentStatus", tag)))
            })?;

            result.push((range, status));
        }

        Ok(result)
    }

    /// Deletes every status row of the series.
    pub fn delete_all(&self, hash_key: &str) -> crate::Result<()> {
        self.table.delete_range(hash_key, None, None)
    }
}
