use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_skiplist::SkipMap;

use crate::{KvStore, RangeIterator, StoreError, properties};

/// Ordered in-memory store backed by a crossbeam skiplist.
///
/// There is no background work, so every settle property reads as zero.
#[derive(Debug, Default)]
pub struct MemTable {
    inner: SkipMap<String, String>,
    flushes: AtomicU64,
}

impl MemTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }
}

impl KvStore for MemTable {
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidArgument("empty key".to_string()));
        }
        self.inner.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.get(key).map(|entry| entry.value().clone()))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key);
        Ok(())
    }

    fn delete_range(&self, start: &str, end: &str) -> Result<(), StoreError> {
        if start >= end {
            log::debug!("Empty delete range [{}, {})", start, end);
            return Ok(());
        }
        for entry in self
            .inner
            .range::<str, _>((Bound::Included(start), Bound::Excluded(end)))
        {
            entry.remove();
        }
        Ok(())
    }

    fn range_iter(&self) -> Box<dyn RangeIterator + '_> {
        Box::new(MemTableIter::new(&self.inner))
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn int_property(&self, name: &str) -> Result<u64, StoreError> {
        if properties::FLUSH.contains(&name) || properties::COMPACTION.contains(&name) {
            Ok(0)
        } else {
            Err(StoreError::UnknownProperty(name.to_string()))
        }
    }
}

/// Cursor over a [`MemTable`]. The skiplist is read live, so `refresh` only
/// re-resolves the current position.
pub struct MemTableIter<'a> {
    map: &'a SkipMap<String, String>,
    current: Option<String>,
}

impl<'a> MemTableIter<'a> {
    fn new(map: &'a SkipMap<String, String>) -> Self {
        Self { map, current: None }
    }

    fn first_at_or_after(&self, bound: Bound<&str>) -> Option<String> {
        self.map.lower_bound(bound).map(|entry| entry.key().clone())
    }
}

impl RangeIterator for MemTableIter<'_> {
    fn seek(&mut self, key: &str) {
        self.current = self.first_at_or_after(Bound::Included(key));
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn next(&mut self) {
        if let Some(current) = self.current.take() {
            self.current = self.first_at_or_after(Bound::Excluded(current.as_str()));
        }
    }

    fn key(&self) -> &str {
        self.current.as_deref().unwrap_or_default()
    }

    fn refresh(&mut self) -> Result<(), StoreError> {
        if let Some(current) = self.current.take() {
            self.current = self.first_at_or_after(Bound::Included(current.as_str()));
        }
        Ok(())
    }
}
