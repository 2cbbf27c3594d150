//! This trait represents the interface for the per-server key/value store.
//! Keys and values are opaque strings and are not interpreted in any way by StorageEngine implementations.
//!
//! Every server added to the balancer owns exactly one [`StorageEngine`]. All access is single-writer,
//! so implementations don't need interior mutability.
use std::fmt::Debug;

pub mod chained;
pub mod in_memory;

pub trait StorageEngine: Debug + Send + Sync {
    /// Returns the value associated with `key`. A missing key is not an error.
    fn get(&self, key: &str) -> Option<String>;

    /// Inserts or replaces the value associated with `key`
    fn put(&mut self, key: String, value: String);

    /// Deletes `key`. Deleting a missing key is a no-op.
    fn delete(&mut self, key: &str);

    fn contains_key(&self, key: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owned snapshot of every (key, value) pair. Each entry shows up exactly once, in no particular order.
    /// Callers that move entries between stores iterate over the snapshot and are free to mutate the store.
    fn export(&self) -> Vec<(String, String)>;
}

/// Type alias for the boxed engines kept by the balancer's server registry
pub type BoxedStorageEngine = Box<dyn StorageEngine>;
