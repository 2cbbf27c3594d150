//! Module that contains the consistent hashing ring and the algorithms that keep keys
//! on the right server when the ring changes
pub mod rebalancing;
pub mod ring;
