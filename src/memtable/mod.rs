//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Concurrent writers on different keys without blocking
//! - Track size for flush triggers
//! - Ordered iteration for SSTable creation and range scans
//!
//! ## Data Structure Choice
//! A lock-free `crossbeam_skiplist::SkipMap<Bytes, Option<Bytes>>`:
//! - Ordered keys (required for SSTable generation)
//! - Concurrent inserts for different keys never block each other
//! - `None` values are tombstones; a delete never removes a node

mod table;

pub use table::{MemTable, MemTableIterator};
