//! SSTable Iterator
//!
//! Sequential iteration over a range of index positions.

use std::sync::Arc;

use crate::entry::Entry;

use super::SSTable;

/// Iterator over SSTable entries in sorted key order
///
/// Owns a reference to the table, which keeps the mapping (and the file, if a
/// compaction retires the table meanwhile) alive until the iterator is dropped.
pub struct SSTableIterator {
    table: Arc<SSTable>,
    /// Next index position to yield
    pos: usize,
    /// One past the last position to yield
    end: usize,
}

impl SSTableIterator {
    pub(super) fn new(table: Arc<SSTable>, pos: usize, end: usize) -> Self {
        Self { table, pos, end }
    }
}

impl Iterator for SSTableIterator {
    /// Tombstones are yielded as entries without a value
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        let entry = self.table.entry_at(self.pos);
        self.pos += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.pos;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SSTableIterator {}
