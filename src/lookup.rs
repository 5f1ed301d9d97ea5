// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::Time;
use parking_lot::Mutex;
use quick_cache::{sync::Cache as QuickCache, UnitWeighter};
use rustc_hash::FxHashMap;
use std::hash::Hash;

/// A memoized lookup result: the serialized value, or a remembered miss
pub(crate) type Memo = Option<Vec<u8>>;

/// How a lookup cache sheds entries on overflow
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum EvictionMode {
    /// Evict least-recently-used entries one by one
    #[default]
    Lru,

    /// Drop half of all entries once the capacity is reached
    ClearHalf,
}

enum Inner<K: Eq + Hash + Clone> {
    Lru(QuickCache<K, Memo, UnitWeighter, rustc_hash::FxBuildHasher>),
    ClearHalf {
        capacity: usize,
        map: Mutex<FxHashMap<K, Memo>>,
    },
}

/// Bounded in-memory map in front of a persistent lookup table
pub(crate) struct LookupCache<K: Eq + Hash + Clone> {
    inner: Inner<K>,
}

impl<K: Eq + Hash + Clone> LookupCache<K> {
    pub fn new(capacity: usize, mode: EvictionMode) -> Self {
        let capacity = capacity.max(1);

        let inner = match mode {
            EvictionMode::Lru => {
                use quick_cache::sync::DefaultLifecycle;

                #[allow(clippy::default_trait_access)]
                let cache = QuickCache::with(
                    capacity,
                    capacity as u64,
                    UnitWeighter,
                    Default::default(),
                    DefaultLifecycle::default(),
                );

                Inner::Lru(cache)
            }
            EvictionMode::ClearHalf => Inner::ClearHalf {
                capacity,
                map: Mutex::new(FxHashMap::default()),
            },
        };

        Self { inner }
    }

    pub fn get(&self, key: &K) -> Option<Memo> {
        match &self.inner {
            Inner::Lru(cache) => cache.get(key),
            Inner::ClearHalf { map, .. } => map.lock().get(key).cloned(),
        }
    }

    pub fn insert(&self, key: K, memo: Memo) {
        match &self.inner {
            Inner::Lru(cache) => cache.insert(key, memo),
            Inner::ClearHalf { capacity, map } => {
                let mut map = map.lock();

                if map.len() >= *capacity && !map.contains_key(&key) {
                    let keep = map.len() / 2;
                    let mut idx = 0;

                    map.retain(|_, _| {
                        idx += 1;
                        idx <= keep
                    });
                }

                map.insert(key, memo);
            }
        }
    }

    pub fn clear(&self) {
        match &self.inner {
            Inner::Lru(cache) => cache.clear(),
            Inner::ClearHalf { map, .. } => map.lock().clear(),
        }
    }
}

/// Serializes a memo for its persistent lookup row.
pub(crate) fn encode_memo(memo: &Memo) -> Vec<u8> {
    match memo {
        None => vec![0],
        Some(bytes) => {
            let mut row = Vec::with_capacity(1 + bytes.len());
            row.push(1);
            row.extend_from_slice(bytes);
            row
        }
    }
}

/// Parses a persistent lookup row back into a memo.
pub(crate) fn decode_memo(row: &[u8]) -> crate::Result<Memo> {
    match row.split_first() {
        Some((0, _)) => Ok(None),
        Some((1, rest)) => Ok(Some(rest.to_vec())),
        Some((tag, _)) => Err(crate::Error::Decode(crate::coding::DecodeError::InvalidTag(
            ("LookupMemo", *tag),
        ))),
        None => Err(crate::Error::Decode(crate::coding::DecodeError::InvalidLength(0))),
    }
}

/// Range key of a shift lookup row: query time, then shift distance.
pub(crate) fn shift_key(t: Time, shift: u32) -> [u8; 12] {
    let mut key = [0; 12];
    key[..8].copy_from_slice(&t.to_key());
    key[8..].copy_from_slice(&shift.to_be_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn memo_roundtrip() -> crate::Result<()> {
        assert_eq!(None, decode_memo(&encode_memo(&None))?);
        assert_eq!(
            Some(vec![1, 2, 3]),
            decode_memo(&encode_memo(&Some(vec![1, 2, 3])))?,
        );
        Ok(())
    }

    #[test]
    fn lru_cache_bounds_entries() {
        let cache = LookupCache::new(4, EvictionMode::Lru);

        for i in 0..100i64 {
            cache.insert(Time::new(i), Some(vec![i as u8]));
        }

        // the most recent insert survives
        assert_eq!(Some(Some(vec![99])), cache.get(&Time::new(99)));
    }

    #[test]
    fn clear_half_cache_sheds_on_overflow() {
        let cache = LookupCache::new(10, EvictionMode::ClearHalf);

        for i in 0..10i64 {
            cache.insert(Time::new(i), None);
        }

        // the next insert triggers the half-clear instead of growing
        cache.insert(Time::new(10), None);

        let survivors = (0..=10i64)
            .filter(|i| cache.get(&Time::new(*i)).is_some())
            .count();

        assert!(survivors <= 6, "{survivors} entries survived");
        assert_eq!(Some(None), cache.get(&Time::new(10)));
    }

    #[test]
    fn cache_clear_forgets_everything() {
        let cache = LookupCache::new(8, EvictionMode::Lru);
        cache.insert(Time::new(1), Some(vec![1]));
        cache.clear();
        assert_eq!(None, cache.get(&Time::new(1)));
    }
}
