//! Tests for the merge iterator
//!
//! These tests verify:
//! - Ascending output across memtables and SSTables
//! - Freshest source wins on duplicate keys
//! - Tombstones shadow older values and are hidden by `live()`

use std::path::Path;
use std::sync::Arc;

use lsmkv::memtable::MemTable;
use lsmkv::merge::{MergeIterator, Source};
use lsmkv::storage::{SSTable, SSTableBuilder};
use lsmkv::Entry;
use tempfile::TempDir;

fn memtable(entries: &[(&str, Option<&str>)]) -> Arc<MemTable> {
    let table = Arc::new(MemTable::new(1));
    for (key, value) in entries {
        match value {
            Some(v) => table.put(key.as_bytes().to_vec(), v.as_bytes().to_vec()),
            None => table.delete(key.as_bytes().to_vec()),
        };
    }
    table
}

fn sstable(dir: &Path, name: &str, entries: &[(&str, Option<&str>)]) -> Arc<SSTable> {
    let path = dir.join(name);
    let mut builder = SSTableBuilder::new(&path).unwrap();
    for (key, value) in entries {
        match value {
            Some(v) => builder.add(key.as_bytes(), v.as_bytes()).unwrap(),
            None => builder.add_tombstone(key.as_bytes()).unwrap(),
        }
    }
    builder.finish().unwrap();
    Arc::new(SSTable::open(&path).unwrap())
}

fn render(entries: impl Iterator<Item = Entry>) -> Vec<(String, Option<String>)> {
    entries
        .map(|e| {
            (
                String::from_utf8(e.key.to_vec()).unwrap(),
                e.value.map(|v| String::from_utf8(v.to_vec()).unwrap()),
            )
        })
        .collect()
}

fn kv(key: &str, value: Option<&str>) -> (String, Option<String>) {
    (key.to_string(), value.map(str::to_string))
}

#[test]
fn test_merge_empty() {
    let merged = MergeIterator::new(Vec::<Source>::new());
    assert_eq!(merged.count(), 0);
}

#[test]
fn test_merge_interleaves_in_order() {
    let temp = TempDir::new().unwrap();
    let mem = memtable(&[("b", Some("1")), ("d", Some("1"))]);
    let sst = sstable(temp.path(), "000001.sst", &[("a", Some("2")), ("c", Some("2"))]);

    let merged = MergeIterator::new(vec![
        Source::from(mem.iter()),
        Source::from(sst.iter(None, None)),
    ]);

    let keys: Vec<String> = render(merged).into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["a", "b", "c", "d"]);
}

#[test]
fn test_freshest_source_wins() {
    let temp = TempDir::new().unwrap();
    let newer = sstable(temp.path(), "000002.sst", &[("k", Some("new"))]);
    let older = sstable(temp.path(), "000001.sst", &[("k", Some("old")), ("z", Some("old"))]);
    let mem = memtable(&[("k", Some("newest"))]);

    let merged = MergeIterator::new(vec![
        Source::from(mem.iter()),
        Source::from(newer.iter(None, None)),
        Source::from(older.iter(None, None)),
    ]);

    assert_eq!(
        render(merged),
        vec![kv("k", Some("newest")), kv("z", Some("old"))]
    );
}

#[test]
fn test_tombstone_shadows_older_value() {
    let temp = TempDir::new().unwrap();
    let older = sstable(temp.path(), "000001.sst", &[("a", Some("1")), ("b", Some("1"))]);
    let mem = memtable(&[("a", None)]);

    let all = MergeIterator::new(vec![
        Source::from(mem.iter()),
        Source::from(older.iter(None, None)),
    ]);
    assert_eq!(render(all), vec![kv("a", None), kv("b", Some("1"))]);

    let live = MergeIterator::new(vec![
        Source::from(mem.iter()),
        Source::from(older.iter(None, None)),
    ])
    .live();
    assert_eq!(render(live), vec![kv("b", Some("1"))]);
}

#[test]
fn test_older_value_does_not_resurrect_under_newer_value() {
    let temp = TempDir::new().unwrap();
    let oldest = sstable(temp.path(), "000001.sst", &[("a", Some("v1"))]);
    let middle = sstable(temp.path(), "000002.sst", &[("a", None)]);
    let newest = sstable(temp.path(), "000003.sst", &[("a", Some("v3"))]);

    let live = MergeIterator::new(vec![
        Source::from(newest.iter(None, None)),
        Source::from(middle.iter(None, None)),
        Source::from(oldest.iter(None, None)),
    ])
    .live();

    assert_eq!(render(live), vec![kv("a", Some("v3"))]);
}

#[test]
fn test_many_sources_stay_sorted_and_unique() {
    let temp = TempDir::new().unwrap();
    let mut tables = Vec::new();
    for t in 0..5 {
        let entries: Vec<(String, Option<String>)> = (0..50)
            .filter(|i| i % (t + 1) == 0)
            .map(|i| (format!("key{:03}", i), Some(format!("t{}", t))))
            .collect();
        let borrowed: Vec<(&str, Option<&str>)> = entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
            .collect();
        tables.push(sstable(temp.path(), &format!("{:06}.sst", t + 1), &borrowed));
    }

    // Newest (last built) first
    let sources = tables.iter().rev().map(|t| Source::from(t.iter(None, None)));
    let merged = render(MergeIterator::new(sources));

    assert_eq!(merged.len(), 50);
    for pair in merged.windows(2) {
        assert!(pair[0].0 < pair[1].0);
    }
    // key000 is in every table; the newest (t4) wins
    assert_eq!(merged[0], kv("key000", Some("t4")));
    // key001 is only in t0
    assert_eq!(merged[1], kv("key001", Some("t0")));
}

#[test]
fn test_bounded_sources() {
    let temp = TempDir::new().unwrap();
    let sst = sstable(
        temp.path(),
        "000001.sst",
        &[("a", Some("1")), ("b", Some("1")), ("c", Some("1"))],
    );
    let mem = memtable(&[("bb", Some("2")), ("d", Some("2"))]);

    let from = Some(&b"b"[..]);
    let to = Some(&b"c"[..]);
    let live = MergeIterator::new(vec![
        Source::from(mem.range(from, to)),
        Source::from(sst.iter(from, to)),
    ])
    .live();

    assert_eq!(render(live), vec![kv("b", Some("1")), kv("bb", Some("2"))]);
}
