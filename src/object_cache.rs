//! Cache of materialized pack objects.
//!
//! Keyed by `(pack_id, offset)`, holding the fully reconstructed bytes of
//! objects that had to be materialized (delta results and delta bases).
//! Eviction is least-recently-used on total bytes held; the default is
//! unbounded, which suits the short ancestry traversals of a version
//! computation. Entries larger than the whole bound are not cached.
//!
//! Recency is tracked with a lazy queue: each touch re-enqueues the key
//! with a fresh stamp, and eviction skips queue entries whose stamp no
//! longer matches the live one.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::object_type::ObjectType;

type CacheKey = (usize, u64);

#[derive(Debug)]
struct CacheSlot {
    object_type: ObjectType,
    bytes: Arc<[u8]>,
    stamp: u64,
}

/// LRU-by-bytes cache of materialized objects.
#[derive(Debug)]
pub struct ObjectCache {
    limit_bytes: Option<u64>,
    total_bytes: u64,
    next_stamp: u64,
    entries: HashMap<CacheKey, CacheSlot>,
    recency: VecDeque<(CacheKey, u64)>,
}

impl ObjectCache {
    /// Creates a cache with the given byte bound; `None` is unbounded.
    #[must_use]
    pub fn new(limit_bytes: Option<u64>) -> Self {
        Self {
            limit_bytes,
            total_bytes: 0,
            next_stamp: 0,
            entries: HashMap::new(),
            recency: VecDeque::new(),
        }
    }

    /// Total bytes currently held.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Looks up materialized bytes, refreshing the entry's recency.
    pub fn get(&mut self, pack_id: usize, offset: u64) -> Option<(ObjectType, Arc<[u8]>)> {
        let key = (pack_id, offset);
        let stamp = self.bump_stamp();
        let slot = self.entries.get_mut(&key)?;
        slot.stamp = stamp;
        self.recency.push_back((key, stamp));
        Some((slot.object_type, Arc::clone(&slot.bytes)))
    }

    /// Inserts materialized bytes, evicting stale entries past the bound.
    ///
    /// An entry that alone exceeds the bound is not cached.
    pub fn insert(&mut self, pack_id: usize, offset: u64, object_type: ObjectType, bytes: Arc<[u8]>) {
        let size = bytes.len() as u64;
        if let Some(limit) = self.limit_bytes {
            if size > limit {
                return;
            }
        }

        let key = (pack_id, offset);
        let stamp = self.bump_stamp();
        if let Some(old) = self.entries.insert(
            key,
            CacheSlot {
                object_type,
                bytes,
                stamp,
            },
        ) {
            self.total_bytes -= old.bytes.len() as u64;
        }
        self.total_bytes += size;
        self.recency.push_back((key, stamp));
        self.evict_to_limit();
    }

    fn bump_stamp(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    fn evict_to_limit(&mut self) {
        let Some(limit) = self.limit_bytes else {
            return;
        };
        while self.total_bytes > limit {
            let Some((key, stamp)) = self.recency.pop_front() else {
                return;
            };
            let live = self
                .entries
                .get(&key)
                .is_some_and(|slot| slot.stamp == stamp);
            if live {
                let slot = self.entries.remove(&key).expect("live slot present");
                self.total_bytes -= slot.bytes.len() as u64;
            }
        }
    }
}
