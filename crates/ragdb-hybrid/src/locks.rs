use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<Mutex<()>>>;

/// One async mutex per key. Entries are dropped once nobody holds or waits
/// for them.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<StdMutex<LockMap>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyedGuard {
        let slot = {
            let mut map = lock_map(&self.inner);
            Arc::clone(map.entry(key.to_string()).or_default())
        };
        let guard = slot.lock_owned().await;
        KeyedGuard { key: key.to_string(), map: Arc::clone(&self.inner), guard: Some(guard) }
    }

    /// Keys currently held or awaited.
    pub fn active(&self) -> usize {
        lock_map(&self.inner).len()
    }
}

fn lock_map(map: &StdMutex<LockMap>) -> MutexGuard<'_, LockMap> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct KeyedGuard {
    key: String,
    map: Arc<StdMutex<LockMap>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = lock_map(&self.map);
        if map.get(&self.key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            map.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = KeyedLocks::new();
        let first = locks.lock("doc").await;
        let contender = tokio::time::timeout(Duration::from_millis(50), locks.lock("doc")).await;
        assert!(contender.is_err());
        drop(first);
        let _again = tokio::time::timeout(Duration::from_millis(500), locks.lock("doc"))
            .await
            .expect("lock released");
    }

    #[tokio::test]
    async fn different_keys_do_not_block_and_idle_entries_go() {
        let locks = KeyedLocks::new();
        let a = locks.lock("a").await;
        let b = locks.lock("b").await;
        assert_eq!(locks.active(), 2);
        drop(a);
        drop(b);
        assert_eq!(locks.active(), 0);
    }
}
