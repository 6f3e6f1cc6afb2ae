use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

const PRUNE_THRESHOLD: usize = 1024;

/// One mutex per key, created on first use. Holders of different keys never
/// wait on each other.
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn handle(&self, key: &K) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.len() >= PRUNE_THRESHOLD {
            // Only the map itself references idle entries.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks.entry(key.clone()).or_default().clone()
    }

    pub fn with_lock<R>(&self, key: &K, f: impl FnOnce() -> R) -> R {
        let handle = self.handle(key);
        let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Holds both keys at once, always acquiring them in key order.
    pub fn with_pair<R>(&self, a: &K, b: &K, f: impl FnOnce() -> R) -> R
    where
        K: Ord,
    {
        if a == b {
            return self.with_lock(a, f);
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first = self.handle(first);
        let second = self.handle(second);
        let _first = first.lock().unwrap_or_else(PoisonError::into_inner);
        let _second = second.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_same_key_is_serialized() {
        let locks = KeyedLocks::new();
        let inside = AtomicUsize::new(0);
        let max_seen = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        locks.with_lock(&"monday", || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            std::thread::yield_now();
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                });
            }
        });

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pair_in_either_order_does_not_deadlock() {
        let locks = KeyedLocks::new();
        std::thread::scope(|s| {
            for i in 0..8 {
                let locks = &locks;
                s.spawn(move || {
                    for _ in 0..100 {
                        if i % 2 == 0 {
                            locks.with_pair(&1, &2, || ());
                        } else {
                            locks.with_pair(&2, &1, || ());
                        }
                    }
                });
            }
        });
        assert_eq!(locks.with_pair(&3, &3, || 7), 7);
    }

    #[test]
    fn test_idle_entries_are_pruned() {
        let locks = KeyedLocks::new();
        for i in 0..PRUNE_THRESHOLD + 10 {
            locks.with_lock(&i, || ());
        }
        assert!(locks.len() < PRUNE_THRESHOLD);
    }
}
