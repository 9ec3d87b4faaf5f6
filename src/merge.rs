//! Merge Iterator
//!
//! K-way merge of memtable and SSTable iterators into one ascending stream
//! with one entry per key.
//!
//! Sources are passed in priority order: `sources[0]` is the freshest (the
//! active memtable), the last one the oldest SSTable. When several sources
//! hold the same key, the entry from the freshest source wins and the others
//! are skipped, even when the winner is a tombstone.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::comparator::compare;
use crate::entry::Entry;
use crate::memtable::MemTableIterator;
use crate::storage::SSTableIterator;

/// An input of the merge
pub enum Source {
    Memtable(MemTableIterator),
    Table(SSTableIterator),
}

impl Iterator for Source {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        match self {
            Source::Memtable(iter) => iter.next(),
            Source::Table(iter) => iter.next(),
        }
    }
}

impl From<MemTableIterator> for Source {
    fn from(iter: MemTableIterator) -> Self {
        Source::Memtable(iter)
    }
}

impl From<SSTableIterator> for Source {
    fn from(iter: SSTableIterator) -> Self {
        Source::Table(iter)
    }
}

/// A source positioned at its current entry
struct HeapEntry {
    entry: Entry,
    /// Index into the source list; lower = fresher
    rank: usize,
    source: Source,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // BinaryHeap is a max-heap: the smallest key, then the lowest rank,
    // must compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.entry.key, &other.entry.key)
            .then(self.rank.cmp(&other.rank))
            .reverse()
    }
}

/// Ordered, deduplicated merge of several sources (tombstones included)
pub struct MergeIterator {
    heap: BinaryHeap<HeapEntry>,
}

impl MergeIterator {
    /// Build a merge over `sources`, freshest first
    pub fn new<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = Source>,
    {
        let mut heap = BinaryHeap::new();
        for (rank, mut source) in sources.into_iter().enumerate() {
            if let Some(entry) = source.next() {
                heap.push(HeapEntry {
                    entry,
                    rank,
                    source,
                });
            }
        }
        Self { heap }
    }

    /// Drop tombstones from the output
    pub fn live(self) -> LiveEntries {
        LiveEntries { inner: self }
    }

    fn advance(&mut self, mut item: HeapEntry) {
        if let Some(entry) = item.source.next() {
            item.entry = entry;
            self.heap.push(item);
        }
    }
}

impl Iterator for MergeIterator {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        let top = self.heap.pop()?;

        // Every other source sitting on the same key is shadowed
        while let Some(next) = self.heap.peek() {
            if compare(&next.entry.key, &top.entry.key) != Ordering::Equal {
                break;
            }
            if let Some(shadowed) = self.heap.pop() {
                self.advance(shadowed);
            }
        }

        let HeapEntry {
            entry,
            rank,
            mut source,
        } = top;
        if let Some(following) = source.next() {
            self.heap.push(HeapEntry {
                entry: following,
                rank,
                source,
            });
        }
        Some(entry)
    }
}

/// A merge with tombstones filtered out; what readers of the store see
pub struct LiveEntries {
    inner: MergeIterator,
}

impl Iterator for LiveEntries {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        loop {
            let entry = self.inner.next()?;
            if !entry.is_tombstone() {
                return Some(entry);
            }
        }
    }
}
