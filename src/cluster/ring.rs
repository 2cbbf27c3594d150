//! The consistent hashing ring used by ringlb.
//!
//! The goal of consistent hashing is to decide which server should own a specific key. It does it
//! by computing a position in a fixed hash space - in this case [0, 2^32) - for both the servers and
//! the keys being stored. The server that owns a key is the first one whose position is higher than
//! or equal to the position of the key. The hash space is viewed as a circular buffer (hence hash ring):
//! keys placed after the last server wrap around to the first one.
//!
//! Example with a hash space that goes from 0 to 10:
//! Nodes:     ['A', 'B', 'C']
//! Nodes_hash:[ 2 ,  5 ,  8 ]
//!
//! key to store: 'foo', hash('foo') = 4 -> owned by node B (hash 5)
//! key to store: 'bar', hash('bar') = 8 -> owned by node C (hash 8, boundaries are inclusive)
//! key to store: 'zoo', hash('zoo') = 9 -> owned by node A (hash 2)
//!
//! Each server shows up in the ring multiple times, once per replica tag. These positions are
//! called virtual nodes and they smooth the key distribution amongst servers.
//!
//! Implementation notes:
//!  1. The ring is a sorted [`Vec`]. Inserting and removing shifts elements around, which is fine for
//!    the ring sizes this crate targets. Lookups use binary search.
//!  2. Equal hashes are ordered by server id so that the ring layout never depends on the order in
//!    which servers were added.
use serde::Serialize;

use crate::error::{Error, Result};

pub type ServerId = i32;

/// A single position of a server on the ring
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct VirtualNode {
    pub hash: u32,
    pub server_id: ServerId,
    /// Replica tag this position was computed from
    pub tag: i32,
}

impl VirtualNode {
    pub fn new(hash: u32, server_id: ServerId, tag: i32) -> Self {
        Self {
            hash,
            server_id,
            tag,
        }
    }

    fn sort_key(&self) -> (u32, ServerId) {
        (self.hash, self.server_id)
    }
}

#[derive(Clone, Debug, Default)]
pub struct HashRing {
    nodes: Vec<VirtualNode>,
}

impl HashRing {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VirtualNode> {
        self.nodes.iter()
    }

    pub fn first(&self) -> Option<&VirtualNode> {
        self.nodes.first()
    }

    /// Returns the index of the given virtual node (matched by hash, server and tag)
    pub fn position(&self, node: &VirtualNode) -> Option<usize> {
        self.nodes
            .binary_search_by_key(&node.sort_key(), VirtualNode::sort_key)
            .ok()
            .filter(|index| self.nodes[*index] == *node)
    }

    pub fn is_first(&self, node: &VirtualNode) -> bool {
        self.position(node) == Some(0)
    }

    pub fn contains_server(&self, server_id: ServerId) -> bool {
        self.nodes.iter().any(|node| node.server_id == server_id)
    }

    /// Whether a virtual node with the same (hash, server_id) pair is already present
    pub fn contains(&self, hash: u32, server_id: ServerId) -> bool {
        self.nodes
            .binary_search_by_key(&(hash, server_id), VirtualNode::sort_key)
            .is_ok()
    }

    /// Distinct server ids in ring order of their first virtual node
    pub fn server_ids(&self) -> Vec<ServerId> {
        let mut ids = Vec::new();
        for node in self.nodes.iter() {
            if !ids.contains(&node.server_id) {
                ids.push(node.server_id);
            }
        }
        ids
    }

    /// Returns the virtual node that owns `hash`: the first one whose hash is greater than or equal
    /// to it, wrapping around to the first virtual node of the ring.
    ///
    /// # Errors
    /// [`Error::EmptyRing`] if no virtual node is present
    pub fn locate(&self, hash: u32) -> Result<&VirtualNode> {
        let index = self.locate_index(hash)?;
        Ok(&self.nodes[index])
    }

    fn locate_index(&self, hash: u32) -> Result<usize> {
        if self.nodes.is_empty() {
            return Err(Error::EmptyRing);
        }

        Ok(self.nodes.partition_point(|node| node.hash < hash) % self.nodes.len())
    }

    /// Inserts `node` at its sorted position and returns its clockwise neighbour,
    /// ie: the virtual node that owned the new node's arc before the insertion.
    ///
    /// Equal hashes are ordered by ascending server id: the new node goes after every
    /// virtual node with a smaller (hash, server_id) and before the first one that is greater.
    /// Returns `None` if the ring was empty. The returned neighbour may belong to the same server
    /// as `node`, callers decide what to do with it.
    ///
    /// # Errors
    /// [`Error::DuplicateVirtualNode`] if the (hash, server_id) pair is already on the ring.
    /// The ring is left untouched in that case.
    pub fn insert(&mut self, node: VirtualNode) -> Result<Option<VirtualNode>> {
        match self
            .nodes
            .binary_search_by_key(&node.sort_key(), VirtualNode::sort_key)
        {
            Ok(_) => Err(Error::DuplicateVirtualNode {
                hash: node.hash,
                server_id: node.server_id,
            }),
            Err(index) => {
                let successor = if self.nodes.is_empty() {
                    None
                } else {
                    Some(self.nodes[index % self.nodes.len()])
                };
                self.nodes.insert(index, node);
                Ok(successor)
            }
        }
    }

    /// Returns the counter-clockwise neighbour of `node`, wrapping around to the last virtual node
    /// when `node` is the first one. A node alone in the ring is its own predecessor.
    ///
    /// # Errors
    /// [`Error::Logic`] if `node` is not on the ring
    pub fn predecessor(&self, node: &VirtualNode) -> Result<VirtualNode> {
        let index = self.position(node).ok_or_else(|| Error::Logic {
            reason: format!("virtual node {:?} is not part of the ring", node),
        })?;

        if index == 0 {
            Ok(self.nodes[self.nodes.len() - 1])
        } else {
            Ok(self.nodes[index - 1])
        }
    }

    /// Removes every virtual node owned by `server_id` and returns them in ring order.
    ///
    /// # Errors
    /// [`Error::UnknownServer`] if the server has no virtual node on the ring
    pub fn remove_all_for_server(&mut self, server_id: ServerId) -> Result<Vec<VirtualNode>> {
        if !self.contains_server(server_id) {
            return Err(Error::UnknownServer { server_id });
        }

        let (removed, kept): (Vec<VirtualNode>, Vec<VirtualNode>) = std::mem::take(&mut self.nodes)
            .into_iter()
            .partition(|node| node.server_id == server_id);
        self.nodes = kept;
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}
