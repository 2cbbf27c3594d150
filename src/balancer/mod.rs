//! The [`LoadBalancer`] is the entry point of ringlb. It owns the [`HashRing`] and one store per server
//! and keeps the two in sync.
//!
//! A balancer is either Empty (no servers, every key based operation is rejected) or Active
//! (at least one server). Every key lives in the store of the server that owns its position on the
//! ring, and topology changes move keys around to keep it that way:
//!  - `add_server` inserts the server's virtual nodes one at a time. Each insertion steals part of the
//!    arc owned by the next virtual node, so only that node's store is scanned.
//!  - `remove_server` drops the server's virtual nodes and stores every key it held again, letting the
//!    updated ring decide where each one goes.
use serde::Serialize;
use tracing::{event, instrument, Level};

use crate::cluster::rebalancing::{Migration, MigrationReport, Rebalancer, ServerRegistry};
use crate::cluster::ring::{HashRing, ServerId, VirtualNode};
use crate::error::{Error, Result};
use crate::hashing::{hash_key, hash_server_tag, KeyHashFn, TagHashFn};
use crate::storage_engine::BoxedStorageEngine;

use self::config::Config;

pub mod config;
pub mod shared;

/// Result of a [`LoadBalancer::retrieve`] call. A missing key is reported as `value: None` along with
/// the server that was consulted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Retrieved {
    pub value: Option<String>,
    pub server_id: ServerId,
}

#[derive(Debug)]
pub struct LoadBalancer {
    ring: HashRing,
    servers: ServerRegistry,
    rebalancer: Rebalancer,
    key_hash_fn: KeyHashFn,
    tag_hash_fn: TagHashFn,
    config: Config,
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::build(Config::default(), hash_key, hash_server_tag)
    }
}

impl LoadBalancer {
    pub fn new(config: Config) -> Result<Self> {
        Self::new_with_hash_fns(config, hash_key, hash_server_tag)
    }

    /// Same as [`LoadBalancer::new`] but with custom functions to place keys and virtual nodes on the ring
    pub fn new_with_hash_fns(
        config: Config,
        key_hash_fn: KeyHashFn,
        tag_hash_fn: TagHashFn,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, key_hash_fn, tag_hash_fn))
    }

    fn build(config: Config, key_hash_fn: KeyHashFn, tag_hash_fn: TagHashFn) -> Self {
        Self {
            ring: HashRing::default(),
            servers: ServerRegistry::new(),
            rebalancer: Rebalancer::new(key_hash_fn),
            key_hash_fn,
            tag_hash_fn,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ring(&self) -> &HashRing {
        &self.ring
    }

    /// True while no server is registered
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Registered servers, sorted by id
    pub fn server_ids(&self) -> Vec<ServerId> {
        let mut ids: Vec<ServerId> = self.servers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of keys held by `server_id`, `None` for unknown servers
    pub fn key_count(&self, server_id: ServerId) -> Option<usize> {
        self.servers.get(&server_id).map(|store| store.len())
    }

    /// Total number of keys held by all servers
    pub fn len(&self) -> usize {
        self.servers.values().map(|store| store.len()).sum()
    }

    /// Returns the server that owns `key` according to the current ring
    ///
    /// # Errors
    /// [`Error::EmptyRing`] if no server is registered
    pub fn owner_of(&self, key: &str) -> Result<ServerId> {
        let hash = (self.key_hash_fn)(key.as_bytes());
        Ok(self.ring.locate(hash)?.server_id)
    }

    /// Stores `value` under `key` on the server that owns the key and returns that server's id
    #[instrument(name = "balancer::store", level = "info", skip(self, value))]
    pub fn store(&mut self, key: &str, value: &str) -> Result<ServerId> {
        let owner = self.owner_of(key)?;
        self.store_mut(owner)?.put(key.to_string(), value.to_string());
        Ok(owner)
    }

    #[instrument(name = "balancer::retrieve", level = "info", skip(self))]
    pub fn retrieve(&self, key: &str) -> Result<Retrieved> {
        let owner = self.owner_of(key)?;
        let store = self.servers.get(&owner).ok_or_else(|| missing_store(owner))?;
        Ok(Retrieved {
            value: store.get(key),
            server_id: owner,
        })
    }

    /// Adds a server with one virtual node per replica and moves to it the keys it now owns.
    ///
    /// # Errors
    /// [`Error::DuplicateServer`] if the id is already registered and [`Error::DuplicateVirtualNode`]
    /// if two replicas of the server hash to the same position. Nothing is mutated in either case.
    #[instrument(name = "balancer::add_server", level = "info", skip(self))]
    pub fn add_server(&mut self, server_id: ServerId) -> Result<MigrationReport> {
        if self.servers.contains_key(&server_id) {
            return Err(Error::DuplicateServer { server_id });
        }

        let nodes = self.virtual_nodes_for(server_id);
        for (i, node) in nodes.iter().enumerate() {
            if nodes[..i].iter().any(|other| other.hash == node.hash) {
                return Err(Error::DuplicateVirtualNode {
                    hash: node.hash,
                    server_id,
                });
            }
        }

        self.servers
            .insert(server_id, self.config.storage_engine.build());

        let mut report = MigrationReport::default();
        for node in nodes {
            let successor = self.ring.insert(node)?;
            let migrations =
                self.rebalancer
                    .on_insert(&self.ring, &node, successor, &mut self.servers)?;
            report.extend(migrations);
        }

        event!(
            Level::INFO,
            "server {} added, {} keys moved to it",
            server_id,
            report.moved()
        );
        Ok(report)
    }

    /// Removes a server and stores every key it held on the servers that own them now.
    /// When the last server is removed its keys are dropped and the balancer becomes Empty.
    ///
    /// # Errors
    /// [`Error::UnknownServer`] if the id is not registered. Nothing is mutated in that case.
    #[instrument(name = "balancer::remove_server", level = "info", skip(self))]
    pub fn remove_server(&mut self, server_id: ServerId) -> Result<MigrationReport> {
        if !self.servers.contains_key(&server_id) {
            return Err(Error::UnknownServer { server_id });
        }

        self.ring.remove_all_for_server(server_id)?;
        let retired = self
            .servers
            .remove(&server_id)
            .ok_or_else(|| missing_store(server_id))?;
        let entries = self.rebalancer.on_remove(server_id, retired);

        let mut report = MigrationReport::default();
        if self.ring.is_empty() {
            if !entries.is_empty() {
                event!(
                    Level::WARN,
                    "last server {} removed, dropping {} keys",
                    server_id,
                    entries.len()
                );
            }
            report.dropped = entries.len();
            return Ok(report);
        }

        for (key, value) in entries {
            let to = self.store(&key, &value)?;
            report.migrations.push(Migration {
                key,
                from: server_id,
                to,
            });
        }

        event!(
            Level::INFO,
            "server {} removed, {} keys redistributed",
            server_id,
            report.moved()
        );
        Ok(report)
    }

    /// Releases every server (in ring order) and the ring itself. Keys are not redistributed.
    /// Calling it more than once is harmless, the balancer is Empty afterwards.
    #[instrument(name = "balancer::shutdown", level = "info", skip(self))]
    pub fn shutdown(&mut self) {
        for server_id in self.ring.server_ids() {
            if let Err(err) = self.ring.remove_all_for_server(server_id) {
                event!(Level::ERROR, "unable to release server {}: {}", server_id, err);
            }
            if let Some(store) = self.servers.remove(&server_id) {
                event!(
                    Level::DEBUG,
                    "released server {} holding {} keys",
                    server_id,
                    store.len()
                );
            }
        }

        self.servers.clear();
        self.ring.clear();
    }

    /// Lists every key stored on a server other than its owner: `from` is where the key is,
    /// `to` is where the ring says it should be. Always empty unless something is badly broken.
    pub fn misplaced_keys(&self) -> Result<Vec<Migration>> {
        let mut misplaced = Vec::new();
        for (server_id, store) in self.servers.iter() {
            for (key, _) in store.export() {
                let owner = self.owner_of(&key)?;
                if owner != *server_id {
                    misplaced.push(Migration {
                        key,
                        from: *server_id,
                        to: owner,
                    });
                }
            }
        }

        Ok(misplaced)
    }

    fn virtual_nodes_for(&self, server_id: ServerId) -> Vec<VirtualNode> {
        (0..self.config.replicas)
            .map(|replica| {
                let tag = (replica as i32)
                    .wrapping_mul(self.config.tag_stride)
                    .wrapping_add(server_id);
                VirtualNode::new((self.tag_hash_fn)(tag), server_id, tag)
            })
            .collect()
    }

    fn store_mut(&mut self, server_id: ServerId) -> Result<&mut BoxedStorageEngine> {
        self.servers
            .get_mut(&server_id)
            .ok_or_else(|| missing_store(server_id))
    }
}

fn missing_store(server_id: ServerId) -> Error {
    Error::Logic {
        reason: format!(
            "server {} is on the ring but has no store. This should never happen.",
            server_id
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::config::{Config, StorageEngine};
    use super::{LoadBalancer, Retrieved};
    use crate::cluster::ring::ServerId;
    use crate::error::Error;

    // keys are decimal numbers and hash to themselves
    fn numeric_hash_fn(key: &[u8]) -> u32 {
        std::str::from_utf8(key).unwrap().parse().unwrap()
    }

    // replica r of server s sits at (r + 1) * 1000 + s * 10
    fn spread_tag_hash_fn(tag: i32) -> u32 {
        ((tag / 100_000) as u32 + 1) * 1000 + (tag % 100_000) as u32 * 10
    }

    // replica r of every server sits at (r + 1) * 1000
    fn colliding_tag_hash_fn(tag: i32) -> u32 {
        ((tag / 100_000) as u32 + 1) * 1000
    }

    fn constant_tag_hash_fn(_: i32) -> u32 {
        42
    }

    fn balancer(tag_hash_fn: fn(i32) -> u32) -> LoadBalancer {
        LoadBalancer::new_with_hash_fns(Config::default(), numeric_hash_fn, tag_hash_fn).unwrap()
    }

    fn owner_table(lb: &LoadBalancer, keys: &[&str]) -> Vec<ServerId> {
        keys.iter()
            .map(|key| lb.retrieve(key).unwrap().server_id)
            .collect()
    }

    fn layout(lb: &LoadBalancer) -> Vec<(u32, ServerId)> {
        lb.ring().iter().map(|n| (n.hash, n.server_id)).collect()
    }

    const KEYS: [&str; 7] = ["500", "1015", "1500", "2015", "3010", "3015", "3500"];

    #[test]
    fn test_first_server_owns_everything() {
        let mut lb = balancer(spread_tag_hash_fn);
        let report = lb.add_server(1).unwrap();
        assert_eq!(report.moved(), 0);

        for key in KEYS {
            assert_eq!(lb.store(key, &format!("value {}", key)).unwrap(), 1);
        }
        assert_eq!(lb.key_count(1), Some(KEYS.len()));
        assert_eq!(
            lb.retrieve("1500").unwrap(),
            Retrieved {
                value: Some("value 1500".to_string()),
                server_id: 1
            }
        );
    }

    #[test]
    fn test_add_server_table() {
        let mut lb = balancer(spread_tag_hash_fn);
        lb.add_server(1).unwrap();
        for key in KEYS {
            lb.store(key, &format!("value {}", key)).unwrap();
        }

        let report = lb.add_server(2).unwrap();
        let mut moved: Vec<&str> = report.migrations.iter().map(|m| m.key.as_str()).collect();
        moved.sort();
        assert_eq!(moved, vec!["1015", "2015", "3015"]);
        assert!(report.migrations.iter().all(|m| m.from == 1 && m.to == 2));

        assert_eq!(
            layout(&lb),
            vec![
                (1010, 1),
                (1020, 2),
                (2010, 1),
                (2020, 2),
                (3010, 1),
                (3020, 2)
            ]
        );
        // 3010 sits exactly on server 1's last replica, 3500 wraps around to the first one
        assert_eq!(owner_table(&lb, &KEYS), vec![1, 2, 1, 2, 1, 2, 1]);
        assert_eq!(lb.key_count(1), Some(4));
        assert_eq!(lb.key_count(2), Some(3));
        for key in KEYS {
            assert_eq!(lb.retrieve(key).unwrap().value.unwrap(), format!("value {}", key));
        }
        assert!(lb.misplaced_keys().unwrap().is_empty());
    }

    #[test]
    fn test_add_server_before_position_zero() {
        let mut lb = balancer(spread_tag_hash_fn);
        lb.add_server(1).unwrap();
        lb.add_server(2).unwrap();
        for key in KEYS {
            lb.store(key, key).unwrap();
        }

        // server 0 sits at 1000, 2000 and 3000: its first replica becomes the head of the ring
        let report = lb.add_server(0).unwrap();
        let mut moved: Vec<&str> = report.migrations.iter().map(|m| m.key.as_str()).collect();
        moved.sort();
        assert_eq!(moved, vec!["1500", "3500", "500"]);

        assert_eq!(owner_table(&lb, &KEYS), vec![0, 2, 0, 2, 1, 2, 0]);
        assert!(lb.misplaced_keys().unwrap().is_empty());
    }

    #[test]
    fn test_remove_server_table() {
        let mut lb = balancer(spread_tag_hash_fn);
        lb.add_server(1).unwrap();
        lb.add_server(2).unwrap();
        for key in KEYS {
            lb.store(key, key).unwrap();
        }

        let report = lb.remove_server(1).unwrap();
        assert_eq!(report.moved(), 4);
        assert_eq!(report.dropped, 0);
        assert!(report.migrations.iter().all(|m| m.from == 1 && m.to == 2));

        assert_eq!(lb.server_ids(), vec![2]);
        assert!(!lb.ring().contains_server(1));
        assert_eq!(lb.ring().len(), 3);
        assert_eq!(lb.key_count(2), Some(KEYS.len()));
        for key in KEYS {
            assert_eq!(
                lb.retrieve(key).unwrap(),
                Retrieved {
                    value: Some(key.to_string()),
                    server_id: 2
                }
            );
        }
    }

    #[test]
    fn test_colliding_servers_are_ordered_by_id() {
        let expected = vec![
            (1000, 1),
            (1000, 2),
            (2000, 1),
            (2000, 2),
            (3000, 1),
            (3000, 2),
        ];

        let mut lb = balancer(colliding_tag_hash_fn);
        lb.add_server(1).unwrap();
        lb.add_server(2).unwrap();
        assert_eq!(layout(&lb), expected);

        let mut lb = balancer(colliding_tag_hash_fn);
        lb.add_server(2).unwrap();
        lb.add_server(1).unwrap();
        assert_eq!(layout(&lb), expected);
    }

    #[test]
    fn test_colliding_server_with_lower_id_takes_over() {
        let mut lb = balancer(colliding_tag_hash_fn);
        lb.add_server(2).unwrap();
        let keys = ["500", "1000", "1500", "2500", "3500"];
        for key in keys {
            assert_eq!(lb.store(key, key).unwrap(), 2);
        }

        // ties resolve to the lowest server id, so server 2 is left with empty arcs
        let report = lb.add_server(1).unwrap();
        assert_eq!(report.moved(), keys.len());
        assert_eq!(lb.key_count(2), Some(0));
        assert_eq!(owner_table(&lb, &keys), vec![1; 5]);
        assert!(lb.misplaced_keys().unwrap().is_empty());

        // and adding a higher id afterwards moves nothing
        let report = lb.add_server(3).unwrap();
        assert_eq!(report.moved(), 0);
        assert_eq!(lb.key_count(1), Some(keys.len()));
    }

    #[test]
    fn test_key_on_virtual_node_hash_belongs_to_it() {
        let mut lb = balancer(spread_tag_hash_fn);
        lb.add_server(1).unwrap();
        lb.add_server(2).unwrap();

        assert_eq!(lb.store("1020", "boundary").unwrap(), 2);
        assert_eq!(lb.store("1021", "after boundary").unwrap(), 1);
        assert_eq!(lb.store("1010", "boundary").unwrap(), 1);
    }

    #[test]
    fn test_empty_balancer_rejects_key_operations() {
        let mut lb = balancer(spread_tag_hash_fn);
        assert!(lb.is_empty());
        assert!(matches!(lb.store("1", "1").err().unwrap(), Error::EmptyRing));
        assert!(matches!(lb.retrieve("1").err().unwrap(), Error::EmptyRing));
    }

    #[test]
    fn test_remove_last_server() {
        let mut lb = balancer(spread_tag_hash_fn);
        lb.add_server(1).unwrap();
        lb.store("10", "a").unwrap();
        lb.store("20", "b").unwrap();

        let report = lb.remove_server(1).unwrap();
        assert_eq!(report.dropped, 2);
        assert_eq!(report.moved(), 0);
        assert!(lb.is_empty());
        assert!(lb.ring().is_empty());

        let err = lb.store("10", "a").err().unwrap();
        assert!(err.is_precondition_violation());
        let err = lb.retrieve("10").err().unwrap();
        assert!(err.is_precondition_violation());

        // the balancer can become Active again
        lb.add_server(1).unwrap();
        assert_eq!(
            lb.retrieve("10").unwrap(),
            Retrieved {
                value: None,
                server_id: 1
            }
        );
    }

    #[test]
    fn test_duplicate_and_unknown_servers() {
        let mut lb = balancer(spread_tag_hash_fn);
        lb.add_server(1).unwrap();
        lb.store("10", "a").unwrap();

        assert!(matches!(
            lb.add_server(1).err().unwrap(),
            Error::DuplicateServer { server_id: 1 }
        ));
        assert!(matches!(
            lb.remove_server(7).err().unwrap(),
            Error::UnknownServer { server_id: 7 }
        ));

        // no partial mutation
        assert_eq!(lb.ring().len(), 3);
        assert_eq!(lb.server_ids(), vec![1]);
        assert_eq!(lb.retrieve("10").unwrap().value.unwrap(), "a");
    }

    #[test]
    fn test_replicas_colliding_with_each_other_are_rejected() {
        let mut lb = balancer(constant_tag_hash_fn);
        let err = lb.add_server(1).err().unwrap();
        assert!(matches!(
            err,
            Error::DuplicateVirtualNode {
                hash: 42,
                server_id: 1
            }
        ));
        assert!(lb.is_empty());
        assert!(lb.ring().is_empty());
    }

    #[test]
    fn test_retrieve_missing_key_is_idempotent() {
        let mut lb = balancer(spread_tag_hash_fn);
        lb.add_server(1).unwrap();
        lb.add_server(2).unwrap();

        let first = lb.retrieve("1500").unwrap();
        let second = lb.retrieve("1500").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.value, None);
        assert_eq!(lb.len(), 0);
    }

    #[test]
    fn test_store_overrides_value() {
        let mut lb = balancer(spread_tag_hash_fn);
        lb.add_server(1).unwrap();
        lb.store("10", "a").unwrap();
        lb.store("10", "b").unwrap();
        assert_eq!(lb.retrieve("10").unwrap().value.unwrap(), "b");
        assert_eq!(lb.len(), 1);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut lb = balancer(spread_tag_hash_fn);
        lb.add_server(1).unwrap();
        lb.add_server(2).unwrap();
        lb.store("1500", "a").unwrap();

        lb.shutdown();
        assert!(lb.is_empty());
        assert!(lb.ring().is_empty());
        assert_eq!(lb.len(), 0);

        lb.shutdown();
        assert!(lb.is_empty());
    }

    #[test]
    fn test_replicas_are_configurable() {
        let config = Config {
            replicas: 5,
            storage_engine: StorageEngine::InMemory,
            ..Default::default()
        };
        let mut lb = LoadBalancer::new(config).unwrap();
        lb.add_server(1).unwrap();
        lb.add_server(2).unwrap();
        assert_eq!(lb.ring().len(), 10);

        lb.remove_server(1).unwrap();
        assert_eq!(lb.ring().len(), 5);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = Config {
            replicas: 0,
            ..Default::default()
        };
        assert!(matches!(
            LoadBalancer::new(config).err().unwrap(),
            Error::InvalidConfig { .. }
        ));
    }
}
