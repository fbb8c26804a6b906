use std::{collections::HashMap, future::Future, hash::Hash, sync::Arc};

use futures::lock::Mutex as AsyncMutex;

type Registry<K> = parking_lot::Mutex<HashMap<K, Arc<AsyncMutex<()>>>>;

/// Mutual exclusion keyed by `K`: futures run under the same key never interleave,
/// while futures under different keys run freely.
///
/// Entries are removed from the registry once nobody holds or waits for them.
pub struct KeyedMutex<K: Eq + Hash> {
    locks: Registry<K>,
}

struct Entry<'a, K: Eq + Hash> {
    locks: &'a Registry<K>,
    key: K,
    mutex: Arc<AsyncMutex<()>>,
}

impl<'a, K: Eq + Hash> Drop for Entry<'a, K> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        // One reference in the registry, one in self: nobody else is waiting
        if Arc::strong_count(&self.mutex) == 2 {
            locks.remove(&self.key);
        }
    }
}

impl<K: Clone + Eq + Hash> KeyedMutex<K> {
    pub fn new() -> KeyedMutex<K> {
        KeyedMutex {
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub async fn run<F: Future>(&self, key: K, f: F) -> F::Output {
        let mutex = self
            .locks
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let entry = Entry {
            locks: &self.locks,
            key,
            mutex,
        };
        let _guard = entry.mutex.lock().await;
        f.await
    }

    /// Number of keys currently held or waited for
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Clone + Eq + Hash> Default for KeyedMutex<K> {
    fn default() -> KeyedMutex<K> {
        KeyedMutex::new()
    }
}
