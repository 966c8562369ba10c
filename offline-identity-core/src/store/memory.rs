//! In-memory key-value store.
//!
//! Nothing survives the process. Useful for tests and for hosts that only
//! need an identity cache for the lifetime of a session.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{StoreError, StoreResult};

use super::KeyValueStore;

/// Thread-safe in-memory store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns all stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Lock("memory store lock poisoned".to_string())
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: String) -> StoreResult<Option<String>> {
        Ok(self.entries.read().map_err(poisoned)?.get(&key).cloned())
    }

    fn write(&self, key: String, value: String) -> StoreResult<()> {
        self.entries.write().map_err(poisoned)?.insert(key, value);
        Ok(())
    }

    fn contains(&self, key: String) -> StoreResult<bool> {
        Ok(self.entries.read().map_err(poisoned)?.contains_key(&key))
    }

    fn insert_if_absent(&self, key: String, value: String) -> StoreResult<String> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries.entry(key).or_insert(value).clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use super::*;

    #[test]
    fn test_read_write_contains() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert!(!store.contains("a".to_string()).expect("contains"));
        assert_eq!(store.read("a".to_string()).expect("read"), None);

        store
            .write("a".to_string(), "1".to_string())
            .expect("write");
        store
            .write("a".to_string(), "2".to_string())
            .expect("overwrite");

        assert!(store.contains("a".to_string()).expect("contains"));
        assert_eq!(
            store.read("a".to_string()).expect("read"),
            Some("2".to_string())
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn test_insert_if_absent_keeps_first_value() {
        let store = MemoryStore::new();
        let first = store
            .insert_if_absent("slot".to_string(), "first".to_string())
            .expect("insert");
        let second = store
            .insert_if_absent("slot".to_string(), "second".to_string())
            .expect("insert");
        assert_eq!(first, "first");
        assert_eq!(second, "first");
    }

    #[test]
    fn test_insert_if_absent_single_winner_across_threads() {
        let store = Arc::new(MemoryStore::new());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store
                        .insert_if_absent("slot".to_string(), format!("value-{i}"))
                        .expect("insert")
                })
            })
            .collect();

        let results: Vec<String> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread join"))
            .collect();
        assert!(results.iter().all(|value| value == &results[0]));
        assert_eq!(
            store.read("slot".to_string()).expect("read"),
            Some(results[0].clone())
        );
    }
}
