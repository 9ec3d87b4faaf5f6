//! MemTable Tests
//!
//! Tests verify:
//! - Basic upsert/get operations
//! - Size tracking
//! - Tombstone handling
//! - Sorted, bounded iteration
//! - Concurrent access patterns

use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use lsmkv::memtable::MemTable;
use lsmkv::Entry;

fn keys(memtable: &Arc<MemTable>, from: Option<&[u8]>, to: Option<&[u8]>) -> Vec<Vec<u8>> {
    memtable.range(from, to).map(|e| e.key.to_vec()).collect()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let memtable = MemTable::new(1);
    assert_eq!(memtable.id(), 1);
    assert_eq!(memtable.len(), 0);
    assert_eq!(memtable.size_bytes(), 0);
    assert!(memtable.is_empty());
}

#[test]
fn test_put_and_get() {
    let memtable = MemTable::new(1);

    memtable.put(&b"key1"[..], &b"value1"[..]);

    let entry = memtable.get(b"key1").unwrap();
    assert_eq!(entry.value, Some(Bytes::from_static(b"value1")));
}

#[test]
fn test_get_nonexistent_key() {
    let memtable = MemTable::new(1);
    assert_eq!(memtable.get(b"nonexistent"), None);
}

#[test]
fn test_put_overwrites_existing() {
    let memtable = MemTable::new(1);

    memtable.put(&b"key"[..], &b"old"[..]);
    memtable.put(&b"key"[..], &b"new"[..]);

    assert_eq!(memtable.len(), 1);
    assert_eq!(memtable.get(b"key").unwrap().value, Some(Bytes::from_static(b"new")));
}

#[test]
fn test_delete_creates_tombstone() {
    let memtable = MemTable::new(1);

    memtable.put(&b"key"[..], &b"value"[..]);
    memtable.delete(&b"key"[..]);

    let entry = memtable.get(b"key").unwrap();
    assert!(entry.is_tombstone());
    assert_eq!(memtable.len(), 1);
}

#[test]
fn test_delete_nonexistent_key_is_recorded() {
    let memtable = MemTable::new(1);

    memtable.delete(&b"ghost"[..]);

    assert!(memtable.get(b"ghost").unwrap().is_tombstone());
}

#[test]
fn test_put_after_delete() {
    let memtable = MemTable::new(1);

    memtable.put(&b"key"[..], &b"v1"[..]);
    memtable.delete(&b"key"[..]);
    memtable.put(&b"key"[..], &b"v2"[..]);

    assert_eq!(memtable.get(b"key").unwrap().value, Some(Bytes::from_static(b"v2")));
}

#[test]
fn test_empty_value_is_not_tombstone() {
    let memtable = MemTable::new(1);

    memtable.upsert(Entry::put(&b"key"[..], Bytes::new()));

    let entry = memtable.get(b"key").unwrap();
    assert!(!entry.is_tombstone());
    assert_eq!(entry.value, Some(Bytes::new()));
}

// =============================================================================
// Size Tracking Tests
// =============================================================================

#[test]
fn test_size_tracking_put() {
    let memtable = MemTable::new(1);

    let size = memtable.put(&b"abc"[..], &b"12345"[..]);

    assert_eq!(size, 8);
    assert_eq!(memtable.size_bytes(), 8);
}

#[test]
fn test_size_tracking_overwrite() {
    let memtable = MemTable::new(1);

    memtable.put(&b"key"[..], &b"long-value"[..]);
    assert_eq!(memtable.size_bytes(), 13);

    let size = memtable.put(&b"key"[..], &b"v"[..]);
    assert_eq!(size, 4);
    assert_eq!(memtable.size_bytes(), 4);
}

#[test]
fn test_size_tracking_delete() {
    let memtable = MemTable::new(1);

    memtable.put(&b"key"[..], &b"value"[..]);
    memtable.delete(&b"key"[..]);

    // Tombstone keeps the key bytes only
    assert_eq!(memtable.size_bytes(), 3);
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_iter_empty() {
    let memtable = Arc::new(MemTable::new(1));
    assert_eq!(memtable.iter().count(), 0);
}

#[test]
fn test_iter_sorted_order() {
    let memtable = Arc::new(MemTable::new(1));
    for key in ["cherry", "apple", "banana"] {
        memtable.put(key.as_bytes().to_vec(), &b"v"[..]);
    }

    assert_eq!(
        keys(&memtable, None, None),
        vec![b"apple".to_vec(), b"banana".to_vec(), b"cherry".to_vec()]
    );
}

#[test]
fn test_iter_includes_tombstones() {
    let memtable = Arc::new(MemTable::new(1));
    memtable.put(&b"a"[..], &b"1"[..]);
    memtable.delete(&b"b"[..]);

    let entries: Vec<Entry> = memtable.iter().collect();
    assert_eq!(entries.len(), 2);
    assert!(entries[1].is_tombstone());
}

#[test]
fn test_range_bounds() {
    let memtable = Arc::new(MemTable::new(1));
    for key in ["a", "b", "c", "d"] {
        memtable.put(key.as_bytes().to_vec(), &b"v"[..]);
    }

    assert_eq!(
        keys(&memtable, Some(&b"b"[..]), Some(&b"d"[..])),
        vec![b"b".to_vec(), b"c".to_vec()]
    );
    assert_eq!(keys(&memtable, Some(&b"bb"[..]), None), vec![b"c".to_vec(), b"d".to_vec()]);
    assert_eq!(keys(&memtable, None, Some(&b"a"[..])), Vec::<Vec<u8>>::new());
    assert_eq!(keys(&memtable, Some(&b"c"[..]), Some(&b"b"[..])), Vec::<Vec<u8>>::new());
}

#[test]
fn test_iter_sees_keys_inserted_ahead() {
    let memtable = Arc::new(MemTable::new(1));
    memtable.put(&b"a"[..], &b"1"[..]);
    memtable.put(&b"c"[..], &b"3"[..]);

    let mut iter = memtable.iter();
    assert_eq!(iter.next().unwrap().key, Bytes::from_static(b"a"));

    memtable.put(&b"b"[..], &b"2"[..]);

    assert_eq!(iter.next().unwrap().key, Bytes::from_static(b"b"));
    assert_eq!(iter.next().unwrap().key, Bytes::from_static(b"c"));
    assert!(iter.next().is_none());
}

#[test]
fn test_iterator_outlives_handle() {
    let memtable = Arc::new(MemTable::new(1));
    memtable.put(&b"k"[..], &b"v"[..]);

    let iter = memtable.iter();
    drop(memtable);

    assert_eq!(iter.count(), 1);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writes() {
    let memtable = Arc::new(MemTable::new(1));
    let mut handles = vec![];

    for t in 0..4 {
        let memtable = Arc::clone(&memtable);
        handles.push(thread::spawn(move || {
            for i in 0..250 {
                memtable.put(format!("t{}-{:04}", t, i).into_bytes(), &b"v"[..]);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(memtable.len(), 1000);
    let collected = keys(&memtable, None, None);
    let mut sorted = collected.clone();
    sorted.sort();
    assert_eq!(collected, sorted);
}

#[test]
fn test_concurrent_overwrites_keep_size_exact() {
    let memtable = Arc::new(MemTable::new(1));
    let mut handles = vec![];

    for t in 0..8usize {
        let memtable = Arc::clone(&memtable);
        handles.push(thread::spawn(move || {
            for i in 0..2000usize {
                let value = vec![b'x'; (t * 7 + i) % 64];
                if i % 5 == 0 {
                    memtable.delete(&b"hot"[..]);
                } else {
                    memtable.put(&b"hot"[..], value);
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let entry = memtable.get(b"hot").unwrap();
    let expected = entry.key.len() + entry.value.map_or(0, |v| v.len());
    assert_eq!(memtable.len(), 1);
    assert_eq!(memtable.size_bytes(), expected as u64);
}
