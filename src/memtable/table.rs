//! MemTable implementation
//!
//! SkipMap-based memtable with atomic size tracking.

use std::cmp::Ordering as KeyOrdering;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;
use parking_lot::Mutex;

use crate::comparator::compare;
use crate::entry::Entry;

/// Lock stripes guarding the read-modify-write of `size` per key
const KEY_STRIPES: usize = 16;

/// In-memory table for recent writes
pub struct MemTable {
    /// Generation id; shared with the WAL file backing this memtable
    id: u64,
    /// Key → value, `None` marks a tombstone
    data: SkipMap<Bytes, Option<Bytes>>,
    /// Sum of key + value lengths of the current contents
    size: AtomicU64,
    stripes: [Mutex<()>; KEY_STRIPES],
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new(id: u64) -> Self {
        Self {
            id,
            data: SkipMap::new(),
            size: AtomicU64::new(0),
            stripes: std::array::from_fn(|_| Mutex::new(())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Point lookup; a tombstone is returned as `Some(entry)` with no value
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.data.get(key).map(|e| Entry {
            key: e.key().clone(),
            value: e.value().clone(),
        })
    }

    /// Insert or replace the entry for `entry.key`
    ///
    /// Returns the memtable size after the write. Upserts of the same key are
    /// serialized on a key stripe so the size stays exact; different keys
    /// rarely share a stripe.
    pub fn upsert(&self, entry: Entry) -> u64 {
        let _stripe = self.stripe(&entry.key).lock();

        let added = entry.size_bytes();
        let replaced = self
            .data
            .get(entry.key.as_ref())
            .map(|e| (e.key().len() + e.value().as_ref().map_or(0, |v| v.len())) as u64);

        self.data.insert(entry.key, entry.value);

        match replaced {
            None => self.size.fetch_add(added, Ordering::SeqCst) + added,
            Some(old) if added >= old => {
                let delta = added - old;
                self.size.fetch_add(delta, Ordering::SeqCst) + delta
            }
            // The replaced bytes are part of the total, so this cannot underflow
            Some(old) => {
                let delta = old - added;
                self.size.fetch_sub(delta, Ordering::SeqCst) - delta
            }
        }
    }

    fn stripe(&self, key: &[u8]) -> &Mutex<()> {
        &self.stripes[crc32fast::hash(key) as usize % KEY_STRIPES]
    }

    /// Put a key-value pair
    pub fn put(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> u64 {
        self.upsert(Entry::put(key, value))
    }

    /// Delete a key (inserts tombstone)
    pub fn delete(&self, key: impl Into<Bytes>) -> u64 {
        self.upsert(Entry::tombstone(key))
    }

    /// Accumulated size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    /// Number of keys, tombstones included
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Ascending iterator over `[from, to)`; `None` leaves that side open
    pub fn range(self: &Arc<Self>, from: Option<&[u8]>, to: Option<&[u8]>) -> MemTableIterator {
        MemTableIterator {
            table: Arc::clone(self),
            next_from: match from {
                Some(k) => Bound::Included(Bytes::copy_from_slice(k)),
                None => Bound::Unbounded,
            },
            to: to.map(Bytes::copy_from_slice),
            done: false,
        }
    }

    /// Iterate over every entry in key order (used by flush)
    pub fn iter(self: &Arc<Self>) -> MemTableIterator {
        self.range(None, None)
    }
}

/// Iterator over MemTable entries
///
/// Holds its own reference to the memtable and re-seeks past the last
/// returned key on every step, so it stays valid while writers insert.
pub struct MemTableIterator {
    table: Arc<MemTable>,
    next_from: Bound<Bytes>,
    to: Option<Bytes>,
    done: bool,
}

impl Iterator for MemTableIterator {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let found = {
            let bound = match &self.next_from {
                Bound::Included(k) => Bound::Included(k.as_ref()),
                Bound::Excluded(k) => Bound::Excluded(k.as_ref()),
                Bound::Unbounded => Bound::Unbounded,
            };
            self.table.data.lower_bound::<[u8]>(bound).map(|e| Entry {
                key: e.key().clone(),
                value: e.value().clone(),
            })
        };

        let entry = match found {
            Some(entry) => entry,
            None => {
                self.done = true;
                return None;
            }
        };

        if let Some(to) = &self.to {
            if compare(&entry.key, to) != KeyOrdering::Less {
                self.done = true;
                return None;
            }
        }

        self.next_from = Bound::Excluded(entry.key.clone());
        Some(entry)
    }
}
