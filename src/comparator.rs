//! Byte-Sequence Comparator
//!
//! The single key order used by every layer: the memtable (through the `Ord`
//! impl of `Bytes`, which agrees with this function), SSTable binary search,
//! the SSTable builder's ordering check and the merge iterator.

use std::cmp::Ordering;

/// Compare two keys.
///
/// The first mismatching byte decides, compared as unsigned. When one key is
/// a prefix of the other, the shorter key sorts first.
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}
