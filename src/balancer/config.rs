use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage_engine::chained::{ChainedHashTable, DEFAULT_BUCKETS};
use crate::storage_engine::in_memory::InMemory;
use crate::storage_engine::BoxedStorageEngine;

pub const DEFAULT_REPLICAS: usize = 3;
/// Replica tags are `replica * tag_stride + server_id`
pub const DEFAULT_TAG_STRIDE: i32 = 100_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Number of virtual nodes per server
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    #[serde(default = "default_tag_stride")]
    pub tag_stride: i32,
    #[serde(default)]
    pub storage_engine: StorageEngine,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageEngine {
    Chained { buckets: usize },
    InMemory,
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::Chained {
            buckets: DEFAULT_BUCKETS,
        }
    }
}

impl StorageEngine {
    /// Builds a fresh, empty store of this kind
    pub fn build(&self) -> BoxedStorageEngine {
        match self {
            StorageEngine::Chained { buckets } => Box::new(ChainedHashTable::with_buckets(*buckets)),
            StorageEngine::InMemory => Box::new(InMemory::default()),
        }
    }
}

fn default_replicas() -> usize {
    DEFAULT_REPLICAS
}

fn default_tag_stride() -> i32 {
    DEFAULT_TAG_STRIDE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            replicas: DEFAULT_REPLICAS,
            tag_stride: DEFAULT_TAG_STRIDE,
            storage_engine: StorageEngine::default(),
        }
    }
}

impl Config {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let c = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&c)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.replicas == 0 {
            return Err(Error::InvalidConfig {
                reason: "replicas must be greater than 0".to_string(),
            });
        }

        if self.tag_stride <= 0 {
            return Err(Error::InvalidConfig {
                reason: format!("tag_stride must be positive, got {}", self.tag_stride),
            });
        }

        if let StorageEngine::Chained { buckets: 0 } = self.storage_engine {
            return Err(Error::InvalidConfig {
                reason: "chained storage engine needs at least one bucket".to_string(),
            });
        }

        Ok(())
    }
}
