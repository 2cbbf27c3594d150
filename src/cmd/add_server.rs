use serde::{Deserialize, Serialize};

use crate::balancer::LoadBalancer;
use crate::cluster::ring::ServerId;
use crate::error::Result;

pub const ADD_SERVER_CMD: &str = "add_server";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddServer {
    server_id: ServerId,
}

impl AddServer {
    pub fn new(server_id: ServerId) -> Self {
        Self { server_id }
    }

    pub fn execute(self, balancer: &mut LoadBalancer) -> Result<AddServerResponse> {
        let report = balancer.add_server(self.server_id)?;
        Ok(AddServerResponse {
            server_id: self.server_id,
            moved: report.moved(),
        })
    }

    pub fn cmd_name() -> &'static str {
        ADD_SERVER_CMD
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddServerResponse {
    pub server_id: ServerId,
    /// Number of keys that moved to the new server
    pub moved: usize,
}

impl std::fmt::Display for AddServerResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Added server {}, {} keys moved.",
            self.server_id, self.moved
        )
    }
}
