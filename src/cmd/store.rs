use serde::{Deserialize, Serialize};

use crate::balancer::LoadBalancer;
use crate::cluster::ring::ServerId;
use crate::error::Result;

pub const STORE_CMD: &str = "store";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    key: String,
    value: String,
}

impl Store {
    pub fn new(key: String, value: String) -> Self {
        Self { key, value }
    }

    pub fn execute(self, balancer: &mut LoadBalancer) -> Result<StoreResponse> {
        let server_id = balancer.store(&self.key, &self.value)?;
        Ok(StoreResponse {
            key: self.key,
            value: self.value,
            server_id,
        })
    }

    pub fn cmd_name() -> &'static str {
        STORE_CMD
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreResponse {
    pub key: String,
    pub value: String,
    pub server_id: ServerId,
}

impl std::fmt::Display for StoreResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stored {} on server {}.", self.value, self.server_id)
    }
}
