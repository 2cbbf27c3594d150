//! A [`LoadBalancer`] that can be shared between tasks.
//!
//! The ring and every store form a single resource guarded by one [`RwLock`]. `store` and topology
//! changes take the write lock. `retrieve` takes the read lock so concurrent reads are allowed,
//! but a read never observes a ring that is halfway through a redistribution.
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::instrument;

use super::{LoadBalancer, Retrieved};
use crate::cluster::rebalancing::MigrationReport;
use crate::cluster::ring::ServerId;
use crate::error::Result;

#[derive(Clone, Debug, Default)]
pub struct SharedBalancer {
    inner: Arc<RwLock<LoadBalancer>>,
}

impl From<LoadBalancer> for SharedBalancer {
    fn from(balancer: LoadBalancer) -> Self {
        Self {
            inner: Arc::new(RwLock::new(balancer)),
        }
    }
}

impl SharedBalancer {
    #[instrument(name = "shared::store", level = "debug", skip(self, value))]
    pub async fn store(&self, key: &str, value: &str) -> Result<ServerId> {
        self.inner.write().await.store(key, value)
    }

    #[instrument(name = "shared::retrieve", level = "debug", skip(self))]
    pub async fn retrieve(&self, key: &str) -> Result<Retrieved> {
        self.inner.read().await.retrieve(key)
    }

    pub async fn add_server(&self, server_id: ServerId) -> Result<MigrationReport> {
        self.inner.write().await.add_server(server_id)
    }

    pub async fn remove_server(&self, server_id: ServerId) -> Result<MigrationReport> {
        self.inner.write().await.remove_server(server_id)
    }

    pub async fn shutdown(&self) {
        self.inner.write().await.shutdown()
    }

    pub async fn server_ids(&self) -> Vec<ServerId> {
        self.inner.read().await.server_ids()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
