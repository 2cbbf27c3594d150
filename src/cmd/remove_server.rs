use serde::{Deserialize, Serialize};

use crate::balancer::LoadBalancer;
use crate::cluster::ring::ServerId;
use crate::error::Result;

pub const REMOVE_SERVER_CMD: &str = "remove_server";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveServer {
    server_id: ServerId,
}

impl RemoveServer {
    pub fn new(server_id: ServerId) -> Self {
        Self { server_id }
    }

    pub fn execute(self, balancer: &mut LoadBalancer) -> Result<RemoveServerResponse> {
        let report = balancer.remove_server(self.server_id)?;
        Ok(RemoveServerResponse {
            server_id: self.server_id,
            moved: report.moved(),
            dropped: report.dropped,
        })
    }

    pub fn cmd_name() -> &'static str {
        REMOVE_SERVER_CMD
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveServerResponse {
    pub server_id: ServerId,
    /// Number of keys handed over to the remaining servers
    pub moved: usize,
    /// Number of keys lost because the last server was removed
    pub dropped: usize,
}

impl std::fmt::Display for RemoveServerResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Removed server {}, {} keys moved.",
            self.server_id, self.moved
        )?;
        if self.dropped > 0 {
            write!(f, " {} keys dropped.", self.dropped)?;
        }
        Ok(())
    }
}
