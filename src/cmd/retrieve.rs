use serde::{Deserialize, Serialize};

use crate::balancer::LoadBalancer;
use crate::cluster::ring::ServerId;
use crate::error::Result;

pub const RETRIEVE_CMD: &str = "retrieve";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retrieve {
    key: String,
}

impl Retrieve {
    pub fn new(key: String) -> Self {
        Self { key }
    }

    pub fn execute(self, balancer: &LoadBalancer) -> Result<RetrieveResponse> {
        let retrieved = balancer.retrieve(&self.key)?;
        Ok(match retrieved.value {
            Some(value) => RetrieveResponse::Found {
                key: self.key,
                value,
                server_id: retrieved.server_id,
            },
            None => RetrieveResponse::NotFound {
                key: self.key,
                server_id: retrieved.server_id,
            },
        })
    }

    pub fn cmd_name() -> &'static str {
        RETRIEVE_CMD
    }
}

/// A missing key is a regular response, not an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetrieveResponse {
    Found {
        key: String,
        value: String,
        server_id: ServerId,
    },
    NotFound {
        key: String,
        server_id: ServerId,
    },
}

impl std::fmt::Display for RetrieveResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrieveResponse::Found {
                value, server_id, ..
            } => write!(f, "Retrieved {} from server {}.", value, server_id),
            RetrieveResponse::NotFound { key, .. } => write!(f, "Key {} not present.", key),
        }
    }
}
