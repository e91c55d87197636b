//! The narrow store capability the replay harness drives, and an in-memory
//! skiplist store implementing it.
//!
//! Handles take `&self` for every call, the way an engine handle shared
//! between a writer and its live iterators does.

pub mod error;
pub mod skiplist;

pub use error::StoreError;
pub use skiplist::{MemTable, MemTableIter};

/// Property names polled while waiting for background work to settle.
pub mod properties {
    pub const MEM_TABLE_FLUSH_PENDING: &str = "rocksdb.mem-table-flush-pending";
    pub const NUM_RUNNING_FLUSHES: &str = "rocksdb.num-running-flushes";
    pub const COMPACTION_PENDING: &str = "rocksdb.compaction-pending";
    pub const ESTIMATE_PENDING_COMPACTION_BYTES: &str = "rocksdb.estimate-pending-compaction-bytes";
    pub const NUM_RUNNING_COMPACTIONS: &str = "rocksdb.num-running-compactions";

    pub const FLUSH: [&str; 2] = [MEM_TABLE_FLUSH_PENDING, NUM_RUNNING_FLUSHES];
    pub const COMPACTION: [&str; 3] = [
        COMPACTION_PENDING,
        ESTIMATE_PENDING_COMPACTION_BYTES,
        NUM_RUNNING_COMPACTIONS,
    ];
}

pub trait KvStore {
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Removes every key in `[start, end)`.
    fn delete_range(&self, start: &str, end: &str) -> Result<(), StoreError>;

    fn range_iter(&self) -> Box<dyn RangeIterator + '_>;

    fn flush(&self) -> Result<(), StoreError>;

    fn int_property(&self, name: &str) -> Result<u64, StoreError>;
}

/// Forward cursor over the store's keyspace.
pub trait RangeIterator {
    /// Positions at the first key `>= key`.
    fn seek(&mut self, key: &str);
    fn valid(&self) -> bool;
    fn next(&mut self);
    /// Only meaningful while `valid()` holds.
    fn key(&self) -> &str;
    /// Picks up writes made since the iterator was created.
    fn refresh(&mut self) -> Result<(), StoreError>;
    fn status(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl<T: KvStore + ?Sized> KvStore for &T {
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn delete_range(&self, start: &str, end: &str) -> Result<(), StoreError> {
        (**self).delete_range(start, end)
    }

    fn range_iter(&self) -> Box<dyn RangeIterator + '_> {
        (**self).range_iter()
    }

    fn flush(&self) -> Result<(), StoreError> {
        (**self).flush()
    }

    fn int_property(&self, name: &str) -> Result<u64, StoreError> {
        (**self).int_property(name)
    }
}
