use memtable::{properties, KvStore};

use crate::config::SettlePolicy;
use crate::ReplayError;

/// Polls the store until no flush or compaction is pending or running.
///
/// Returns the number of polls it took. A property that cannot be read counts
/// as unsettled for that poll.
pub async fn settle<S: KvStore + ?Sized>(
    store: &S,
    policy: &SettlePolicy,
) -> Result<u32, ReplayError> {
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;
        match pending_work(store) {
            Ok(0) => {
                log::debug!("Store settled after {} polls", attempt);
                return Ok(attempt);
            }
            Ok(pending) => log::trace!("Poll {}: {} units of background work pending", attempt, pending),
            Err(e) => log::debug!("Poll {}: could not read store properties: {}", attempt, e),
        }
    }

    log::warn!(
        "Store still busy after {} polls of {:?}",
        policy.max_attempts,
        policy.interval
    );
    Err(ReplayError::SettleTimeout {
        attempts: policy.max_attempts,
    })
}

fn pending_work<S: KvStore + ?Sized>(store: &S) -> Result<u64, memtable::StoreError> {
    let mut pending = 0u64;
    for name in properties::FLUSH.iter().chain(properties::COMPACTION.iter()) {
        pending = pending.saturating_add(store.int_property(name)?);
    }
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memtable::{MemTable, RangeIterator, StoreError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Reports pending compaction bytes for the first `busy_polls` reads of
    /// that property, or fails them outright.
    struct BusyStore {
        inner: MemTable,
        busy_polls: u32,
        unreadable: bool,
        polls: AtomicU32,
    }

    impl BusyStore {
        fn new(busy_polls: u32, unreadable: bool) -> Self {
            Self {
                inner: MemTable::new(),
                busy_polls,
                unreadable,
                polls: AtomicU32::new(0),
            }
        }
    }

    impl KvStore for BusyStore {
        fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.put(key, value)
        }

        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key)
        }

        fn delete_range(&self, start: &str, end: &str) -> Result<(), StoreError> {
            self.inner.delete_range(start, end)
        }

        fn range_iter(&self) -> Box<dyn RangeIterator + '_> {
            self.inner.range_iter()
        }

        fn flush(&self) -> Result<(), StoreError> {
            self.inner.flush()
        }

        fn int_property(&self, name: &str) -> Result<u64, StoreError> {
            if name != properties::ESTIMATE_PENDING_COMPACTION_BYTES {
                return self.inner.int_property(name);
            }
            let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if poll > self.busy_polls {
                Ok(0)
            } else if self.unreadable {
                Err(StoreError::UnknownProperty(name.to_string()))
            } else {
                Ok(4096)
            }
        }
    }

    fn policy(max_attempts: u32) -> SettlePolicy {
        SettlePolicy {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    #[tokio::test]
    async fn test_idle_store_settles_on_first_poll() -> Result<(), ReplayError> {
        let store = MemTable::new();
        assert_eq!(settle(&store, &policy(3)).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_waits_for_pending_work() -> Result<(), ReplayError> {
        let store = BusyStore::new(4, false);
        assert_eq!(settle(&store, &policy(10)).await?, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_property_is_not_settled() -> Result<(), ReplayError> {
        let store = BusyStore::new(2, true);
        assert_eq!(settle(&store, &policy(10)).await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_times_out() {
        let store = BusyStore::new(u32::MAX, false);
        let result = settle(&store, &policy(3)).await;
        assert!(matches!(result, Err(ReplayError::SettleTimeout { attempts: 3 })));
        assert_eq!(store.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_times_out_immediately() {
        let store = MemTable::new();
        let result = settle(&store, &policy(0)).await;
        assert!(matches!(result, Err(ReplayError::SettleTimeout { attempts: 0 })));
    }
}
