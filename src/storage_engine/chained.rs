//! The default [`StorageEngine`] used by every server: a hash table with a fixed number of buckets
//! and chained entries for collision resolution.
//!
//! The bucket for a key is `hash_key(key) % buckets`. The bucket count is chosen at construction
//! time and never changes, so long chains are expected when a server holds many more keys than
//! it has buckets.
use tracing::instrument;

use super::StorageEngine;
use crate::hashing::{hash_key, KeyHashFn};

pub const DEFAULT_BUCKETS: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Entry {
    key: String,
    value: String,
}

#[derive(Clone, Debug)]
pub struct ChainedHashTable {
    buckets: Vec<Vec<Entry>>,
    len: usize,
    hash_fn: KeyHashFn,
}

impl Default for ChainedHashTable {
    fn default() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }
}

impl ChainedHashTable {
    /// Builds a table with `buckets` chains. A bucket count of zero is bumped to one.
    pub fn with_buckets(buckets: usize) -> Self {
        Self::new_with_hash_fn(buckets, hash_key)
    }

    pub fn new_with_hash_fn(buckets: usize, hash_fn: KeyHashFn) -> Self {
        let buckets = buckets.max(1);
        Self {
            buckets: vec![Vec::new(); buckets],
            len: 0,
            hash_fn,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_index(&self, key: &str) -> usize {
        (self.hash_fn)(key.as_bytes()) as usize % self.buckets.len()
    }

    fn bucket(&self, key: &str) -> &Vec<Entry> {
        &self.buckets[self.bucket_index(key)]
    }
}

impl StorageEngine for ChainedHashTable {
    #[instrument(name = "storage_engine::chained::get", level = "trace", skip(self))]
    fn get(&self, key: &str) -> Option<String> {
        self.bucket(key)
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.clone())
    }

    #[instrument(name = "storage_engine::chained::put", level = "trace", skip(self))]
    fn put(&mut self, key: String, value: String) {
        let index = self.bucket_index(&key);
        let bucket = &mut self.buckets[index];
        match bucket.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => entry.value = value,
            None => {
                bucket.push(Entry { key, value });
                self.len += 1;
            }
        }
    }

    #[instrument(name = "storage_engine::chained::delete", level = "trace", skip(self))]
    fn delete(&mut self, key: &str) {
        let index = self.bucket_index(key);
        let bucket = &mut self.buckets[index];
        if let Some(position) = bucket.iter().position(|entry| entry.key == key) {
            bucket.remove(position);
            self.len -= 1;
        }
    }

    fn contains_key(&self, key: &str) -> bool {
        self.bucket(key).iter().any(|entry| entry.key == key)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn export(&self) -> Vec<(String, String)> {
        self.buckets
            .iter()
            .flatten()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect()
    }
}
