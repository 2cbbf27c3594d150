//! Component responsible for moving keys between servers when ring membership changes.
//!
//! When a virtual node is inserted, it takes over part of the arc owned by its clockwise neighbour.
//! Only the neighbour's store can hold keys from that arc, so only that store is scanned.
//! When a server leaves, every key it held is handed back to the balancer to be stored again.
use std::collections::HashMap;

use serde::Serialize;
use tracing::{event, instrument, Level};

use super::ring::{HashRing, ServerId, VirtualNode};
use crate::error::{Error, Result};
use crate::hashing::KeyHashFn;
use crate::storage_engine::BoxedStorageEngine;

/// Every store in the system, keyed by the server that owns it
pub type ServerRegistry = HashMap<ServerId, BoxedStorageEngine>;

/// The slice of the hash space owned by a virtual node: `(lower, upper]`.
///
/// When the virtual node is the first one of the ring the arc goes around position 0 and the
/// range becomes `(lower, u32::MAX] U [0, upper]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct KeyRange {
    pub lower: u32,
    pub upper: u32,
    pub wraps: bool,
}

impl KeyRange {
    /// Computes the arc owned by `node`, bounded by its predecessor
    pub fn owned_by(ring: &HashRing, node: &VirtualNode) -> Result<Self> {
        let predecessor = ring.predecessor(node)?;
        Ok(Self {
            lower: predecessor.hash,
            upper: node.hash,
            wraps: ring.is_first(node),
        })
    }

    pub fn contains(&self, hash: u32) -> bool {
        if self.wraps {
            hash > self.lower || hash <= self.upper
        } else {
            hash > self.lower && hash <= self.upper
        }
    }
}

/// A single key that changed owner
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Migration {
    pub key: String,
    pub from: ServerId,
    pub to: ServerId,
}

/// Summary of a topology change
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub migrations: Vec<Migration>,
    /// Keys discarded because no server was left to hold them
    pub dropped: usize,
}

impl MigrationReport {
    pub fn moved(&self) -> usize {
        self.migrations.len()
    }

    pub fn extend(&mut self, migrations: Vec<Migration>) {
        self.migrations.extend(migrations);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Rebalancer {
    key_hash_fn: KeyHashFn,
}

impl Rebalancer {
    pub fn new(key_hash_fn: KeyHashFn) -> Self {
        Self { key_hash_fn }
    }

    /// Moves to `inserted`'s store every key of `successor`'s store that now falls in `inserted`'s arc.
    ///
    /// Nothing happens when there is no successor (first virtual node of the ring) or when the
    /// successor belongs to the same server: those keys already live in the right store.
    /// Each key is written to the new store before being deleted from the old one.
    #[instrument(name = "rebalancing::on_insert", level = "debug", skip(self, ring, servers))]
    pub fn on_insert(
        &self,
        ring: &HashRing,
        inserted: &VirtualNode,
        successor: Option<VirtualNode>,
        servers: &mut ServerRegistry,
    ) -> Result<Vec<Migration>> {
        let successor = match successor {
            Some(successor) if successor.server_id != inserted.server_id => successor,
            _ => return Ok(Vec::new()),
        };

        let range = KeyRange::owned_by(ring, inserted)?;
        let snapshot = registered(servers, successor.server_id)?.export();

        let mut migrations = Vec::new();
        for (key, value) in snapshot {
            if !range.contains((self.key_hash_fn)(key.as_bytes())) {
                continue;
            }

            registered_mut(servers, inserted.server_id)?.put(key.clone(), value);
            registered_mut(servers, successor.server_id)?.delete(&key);
            migrations.push(Migration {
                key,
                from: successor.server_id,
                to: inserted.server_id,
            });
        }

        event!(
            Level::DEBUG,
            "moved {} keys from server {} to server {} (range {:?})",
            migrations.len(),
            successor.server_id,
            inserted.server_id,
            range
        );

        Ok(migrations)
    }

    /// Retires a store whose virtual nodes already left the ring and returns its entries
    /// so they can be stored again.
    #[instrument(name = "rebalancing::on_remove", level = "debug", skip(self, retired))]
    pub fn on_remove(
        &self,
        server_id: ServerId,
        retired: BoxedStorageEngine,
    ) -> Vec<(String, String)> {
        let entries = retired.export();
        event!(
            Level::DEBUG,
            "retiring server {} with {} keys",
            server_id,
            entries.len()
        );
        entries
    }
}

fn registered(servers: &ServerRegistry, server_id: ServerId) -> Result<&BoxedStorageEngine> {
    servers.get(&server_id).ok_or_else(|| Error::Logic {
        reason: format!("server {} is on the ring but has no store", server_id),
    })
}

fn registered_mut(
    servers: &mut ServerRegistry,
    server_id: ServerId,
) -> Result<&mut BoxedStorageEngine> {
    servers.get_mut(&server_id).ok_or_else(|| Error::Logic {
        reason: format!("server {} is on the ring but has no store", server_id),
    })
}
