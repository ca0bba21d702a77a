//! Replication between hosted arrays and their replicas.
//!
//! - [`replica`]: the replica-side mirror that applies delta batches
//! - [`link`]: the tokio tasks that move batches from a host to its replicas

pub mod link;
pub mod replica;


pub use link::{ReplicationLink, spawn_replica};
pub use replica::ReplicaMirror;
