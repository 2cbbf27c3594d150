pub mod balancer;
pub mod cluster;
pub mod cmd;
pub mod error;
pub mod hashing;
pub mod storage_engine;
pub mod telemetry;
pub mod utils;

pub use balancer::{LoadBalancer, Retrieved};
pub use cluster::ring::ServerId;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;
