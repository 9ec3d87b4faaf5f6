//! Tests for the manifest and table catalog
//!
//! These tests verify:
//! - Manifest load/write round trip and validation
//! - Catalog startup: missing files, unlisted files, temp leftovers
//! - Snapshot publication on add/replace
//! - Deferred deletion of compacted tables

use std::fs;
use std::path::Path;
use std::sync::Arc;

use lsmkv::storage::{Manifest, SSTable, SSTableBuilder, TableCatalog, MANIFEST_FILE};
use lsmkv::LsmError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Write a table with `keys` (all mapped to "v") at the next catalog slot
fn build_table(catalog: &TableCatalog, keys: &[&str]) -> SSTable {
    let (_, path) = catalog.allocate();
    let mut builder = SSTableBuilder::new(&path).unwrap();
    for key in keys {
        builder.add(key.as_bytes(), b"v").unwrap();
    }
    builder.finish().unwrap();
    SSTable::open(&path).unwrap()
}

fn manifest_lines(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join(MANIFEST_FILE))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Manifest Tests
// =============================================================================

#[test]
fn test_manifest_missing_is_empty() {
    let temp = TempDir::new().unwrap();
    let manifest = Manifest::new(temp.path());

    assert!(!manifest.exists());
    assert!(manifest.load().unwrap().is_empty());
}

#[test]
fn test_manifest_write_and_load() {
    let temp = TempDir::new().unwrap();
    let manifest = Manifest::new(temp.path());

    let names = vec!["000001.sst".to_string(), "000003.sst".to_string()];
    manifest.write(&names).unwrap();

    assert!(manifest.exists());
    assert_eq!(manifest.load().unwrap(), names);
    assert!(!temp.path().join("MANIFEST.tmp").exists());
}

#[test]
fn test_manifest_rejects_duplicates() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(MANIFEST_FILE), "000001.sst\n000001.sst\n").unwrap();

    let result = Manifest::new(temp.path()).load();
    assert!(matches!(result, Err(LsmError::Corruption(_))));
}

#[test]
fn test_manifest_rejects_path_components() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(MANIFEST_FILE), "../escape.sst\n").unwrap();

    let result = Manifest::new(temp.path()).load();
    assert!(matches!(result, Err(LsmError::Corruption(_))));
}

#[test]
fn test_manifest_removes_stale_tmp() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("MANIFEST.tmp"), "junk").unwrap();
    let manifest = Manifest::new(temp.path());

    assert!(manifest.remove_stale_tmp().unwrap());
    assert!(!manifest.remove_stale_tmp().unwrap());
}

// =============================================================================
// Catalog Startup Tests
// =============================================================================

#[test]
fn test_open_empty_directory() {
    let temp = TempDir::new().unwrap();

    let catalog = TableCatalog::open(temp.path()).unwrap();

    assert_eq!(catalog.sstable_count(), 0);
    assert_eq!(catalog.next_table_id(), 1);
    assert!(temp.path().join(MANIFEST_FILE).exists());
}

#[test]
fn test_reopen_restores_tables_in_order() {
    let temp = TempDir::new().unwrap();
    {
        let catalog = TableCatalog::open(temp.path()).unwrap();
        let t1 = build_table(&catalog, &["a"]);
        catalog.add(t1).unwrap();
        let t2 = build_table(&catalog, &["b"]);
        catalog.add(t2).unwrap();
    }

    let catalog = TableCatalog::open(temp.path()).unwrap();
    let snapshot = catalog.snapshot();

    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.tables()[0].id(), 2);
    assert_eq!(snapshot.tables()[1].id(), 1);
    assert_eq!(catalog.next_table_id(), 3);
    assert_eq!(manifest_lines(temp.path()), vec!["000001.sst", "000002.sst"]);
}

#[test]
fn test_open_fails_when_listed_table_missing() {
    let temp = TempDir::new().unwrap();
    {
        let catalog = TableCatalog::open(temp.path()).unwrap();
        let table = build_table(&catalog, &["a"]);
        catalog.add(table).unwrap();
    }
    fs::remove_file(temp.path().join("000001.sst")).unwrap();

    let result = TableCatalog::open(temp.path());
    assert!(matches!(result, Err(LsmError::Corruption(_))));
}

#[test]
fn test_open_fails_when_listed_table_corrupt() {
    let temp = TempDir::new().unwrap();
    {
        let catalog = TableCatalog::open(temp.path()).unwrap();
        let table = build_table(&catalog, &["a"]);
        catalog.add(table).unwrap();
    }
    fs::write(temp.path().join("000001.sst"), b"not an sstable at all, really").unwrap();

    let result = TableCatalog::open(temp.path());
    assert!(matches!(result, Err(LsmError::Corruption(_))));
}

#[test]
fn test_open_removes_unlisted_and_temp_files() {
    let temp = TempDir::new().unwrap();
    {
        let catalog = TableCatalog::open(temp.path()).unwrap();
        // Written but never added: a crash between write and publish
        build_table(&catalog, &["orphan"]);
    }
    fs::write(temp.path().join("000009.sst.tmp"), b"partial").unwrap();

    let catalog = TableCatalog::open(temp.path()).unwrap();

    assert_eq!(catalog.sstable_count(), 0);
    assert!(!temp.path().join("000001.sst").exists());
    assert!(!temp.path().join("000009.sst.tmp").exists());
    // Ids are never reused
    assert_eq!(catalog.next_table_id(), 2);
}

#[test]
fn test_open_refuses_tables_without_manifest() {
    let temp = TempDir::new().unwrap();
    {
        let catalog = TableCatalog::open(temp.path()).unwrap();
        let table = build_table(&catalog, &["a"]);
        catalog.add(table).unwrap();
    }
    fs::remove_file(temp.path().join(MANIFEST_FILE)).unwrap();

    let result = TableCatalog::open(temp.path());

    assert!(matches!(result, Err(LsmError::Corruption(_))));
    assert!(temp.path().join("000001.sst").exists());
    assert!(!temp.path().join(MANIFEST_FILE).exists());
}

#[test]
fn test_failed_manifest_rewrite_leaves_catalog_unchanged() {
    let temp = TempDir::new().unwrap();
    let catalog = TableCatalog::open(temp.path()).unwrap();
    let first = build_table(&catalog, &["a"]);
    catalog.add(first).unwrap();

    // A directory in the way makes the temp manifest impossible to create
    let blocker = temp.path().join("MANIFEST.tmp");
    fs::create_dir(&blocker).unwrap();
    let second = build_table(&catalog, &["b"]);
    let version = catalog.snapshot().version();

    assert!(catalog.add(second).is_err());
    assert_eq!(catalog.sstable_count(), 1);
    assert_eq!(catalog.snapshot().version(), version);
    assert_eq!(manifest_lines(temp.path()), vec!["000001.sst"]);

    fs::remove_dir(&blocker).unwrap();
    let third = build_table(&catalog, &["c"]);
    catalog.add(third).unwrap();
    assert_eq!(manifest_lines(temp.path()), vec!["000001.sst", "000003.sst"]);
    drop(catalog);

    // The unpublished table is swept on the next open
    let catalog = TableCatalog::open(temp.path()).unwrap();
    assert_eq!(catalog.sstable_count(), 2);
    assert!(!temp.path().join("000002.sst").exists());
}

// =============================================================================
// Snapshot Tests
// =============================================================================

#[test]
fn test_add_publishes_new_snapshot() {
    let temp = TempDir::new().unwrap();
    let catalog = TableCatalog::open(temp.path()).unwrap();

    let before = catalog.snapshot();
    let table = build_table(&catalog, &["a"]);
    catalog.add(table).unwrap();
    let after = catalog.snapshot();

    assert_eq!(before.len(), 0);
    assert_eq!(after.len(), 1);
    assert!(after.version() > before.version());
}

#[test]
fn test_replace_keeps_newer_tables_newer() {
    let temp = TempDir::new().unwrap();
    let catalog = TableCatalog::open(temp.path()).unwrap();
    for key in ["a", "b", "c"] {
        let table = build_table(&catalog, &[key]);
        catalog.add(table).unwrap();
    }

    // Compact the two oldest (ids 2 and 1)
    let snapshot = catalog.snapshot();
    let inputs: Vec<Arc<SSTable>> = snapshot.tables()[1..].to_vec();
    let output = build_table(&catalog, &["a", "b"]);
    catalog.replace(&inputs, Some(output)).unwrap();

    let ids: Vec<u64> = catalog.snapshot().tables().iter().map(|t| t.id()).collect();
    assert_eq!(ids, vec![3, 4]);
    assert_eq!(manifest_lines(temp.path()), vec!["000004.sst", "000003.sst"]);
    assert!(inputs.iter().all(|t| t.is_stale()));
    assert_eq!(inputs[0].compacted_to(), Some(4));
}

#[test]
fn test_replace_with_nothing() {
    let temp = TempDir::new().unwrap();
    let catalog = TableCatalog::open(temp.path()).unwrap();
    let table = build_table(&catalog, &["a"]);
    let table = catalog.add(table).unwrap();

    let result = catalog.replace(&[Arc::clone(&table)], None).unwrap();

    assert!(result.is_none());
    assert_eq!(catalog.sstable_count(), 0);
    assert!(table.is_stale());
    assert_eq!(table.compacted_to(), None);
}

#[test]
fn test_replace_rejects_dead_inputs() {
    let temp = TempDir::new().unwrap();
    let catalog = TableCatalog::open(temp.path()).unwrap();
    let table = build_table(&catalog, &["a"]);
    let table = catalog.add(table).unwrap();
    catalog.replace(&[Arc::clone(&table)], None).unwrap();

    let result = catalog.replace(&[table], None);
    assert!(matches!(result, Err(LsmError::Storage(_))));
}

#[test]
fn test_replace_rejects_gaps() {
    let temp = TempDir::new().unwrap();
    let catalog = TableCatalog::open(temp.path()).unwrap();
    for key in ["a", "b", "c"] {
        let table = build_table(&catalog, &[key]);
        catalog.add(table).unwrap();
    }

    let snapshot = catalog.snapshot();
    let inputs = vec![Arc::clone(&snapshot.tables()[0]), Arc::clone(&snapshot.tables()[2])];

    assert!(catalog.replace(&inputs, None).is_err());
    assert_eq!(catalog.sstable_count(), 3);
}

#[test]
fn test_old_snapshot_keeps_replaced_file_alive() {
    let temp = TempDir::new().unwrap();
    let catalog = TableCatalog::open(temp.path()).unwrap();
    let table = build_table(&catalog, &["a"]);
    catalog.add(table).unwrap();
    let path = temp.path().join("000001.sst");

    let old = catalog.snapshot();
    let inputs = old.tables().to_vec();
    catalog.replace(&inputs, None).unwrap();
    drop(inputs);

    assert!(path.exists());
    assert!(old.tables()[0].get(b"a").is_some());

    drop(old);
    assert!(!path.exists());
}
