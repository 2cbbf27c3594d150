//! An in-memory [`StorageEngine`] implementation
//!
//! This implementation uses a [`HashMap`] and does nothing fancy around performance.
//! It's the most straightforward implementation of a [`StorageEngine`] and is mostly used as a
//! reference when testing the [`super::chained::ChainedHashTable`].
use std::collections::HashMap;
use tracing::instrument;

use super::StorageEngine;

/// Type alias for the underlying datastructure used to store the key/value pairs
type Store = HashMap<String, String>;

/// The InMemory [`StorageEngine`] definition
#[derive(Clone, Debug, Default)]
pub struct InMemory {
    inner: Store,
}

impl StorageEngine for InMemory {
    #[instrument(name = "storage_engine::in_memory::get", level = "trace", skip(self))]
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    #[instrument(name = "storage_engine::in_memory::put", level = "trace", skip(self))]
    fn put(&mut self, key: String, value: String) {
        self.inner
            .entry(key)
            .and_modify(|e| *e = value.clone())
            .or_insert(value);
    }

    #[instrument(name = "storage_engine::in_memory::delete", level = "trace", skip(self))]
    fn delete(&mut self, key: &str) {
        self.inner.remove(key);
    }

    fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn export(&self) -> Vec<(String, String)> {
        self.inner
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
