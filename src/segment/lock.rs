// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::SegmentedKey;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::{sync::Arc, time::Duration};

/// The lock object shared by all users of one segment
///
/// `monitor` serializes status transitions: a candidate takes it before
/// touching the read/write lock, so the bounded write acquisition below
/// never competes with another candidate, only with in-flight readers.
pub struct SegmentLock {
    /// Identity mutex serializing initialization candidates
    pub monitor: Mutex<()>,

    /// Readers observe status / stream values, writers initialize and
    /// update
    pub rw: RwLock<()>,
}

impl SegmentLock {
    fn new() -> Self {
        Self {
            monitor: Mutex::new(()),
            rw: RwLock::new(()),
        }
    }

    /// Acquires the write half within the given budget.
    ///
    /// A timeout maps to [`crate::Error::LockTimeout`], a retry-later
    /// fault, so an unclosed reader cannot hang a writer forever.
    pub fn write_within(
        &self,
        budget: Duration,
    ) -> crate::Result<parking_lot::RwLockWriteGuard<'_, ()>> {
        self.rw.try_write_for(budget).ok_or(crate::Error::LockTimeout)
    }
}

/// Hands out the per-segment lock objects
///
/// All holders of the same segmented key observe the same lock identity.
#[derive(Default)]
pub struct LockRegistry {
    locks: Mutex<FxHashMap<SegmentedKey, Arc<SegmentLock>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, seg: &SegmentedKey) -> Arc<SegmentLock> {
        self.locks
            .lock()
            .entry(seg.clone())
            .or_insert_with(|| Arc::new(SegmentLock::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Time, TimeRange};
    use test_log::test;

    fn key() -> SegmentedKey {
        SegmentedKey::new(
            "series".into(),
            TimeRange::new(Time::new(0), Time::new(9)),
        )
    }

    #[test]
    fn lock_registry_shares_identity() {
        let registry = LockRegistry::new();
        let a = registry.lock_for(&key());
        let b = registry.lock_for(&key());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn write_lock_budget_expires() {
        let registry = LockRegistry::new();
        let lock = registry.lock_for(&key());

        let _read = lock.rw.read();

        assert!(matches!(
            lock.write_within(Duration::from_millis(50)),
            Err(crate::Error::LockTimeout),
        ));
    }
}
