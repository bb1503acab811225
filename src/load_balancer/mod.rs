//! Replica selection subsystem.
//!
//! # Data Flow
//! ```text
//! Read request
//!     → registry.rs (point-in-time snapshot of replicas)
//!     → round_robin.rs (advance cursor, pick the n-th ready replica)
//!     → connection.rs (forward to the chosen driver handle)
//!     → No ready replica: fall back to the primary
//! ```
//!
//! # Design Decisions
//! - The selector reads the healthy count cached by the last health tick;
//!   it never probes connections itself
//! - Readiness may change between the count and the scan, so a miss falls
//!   back to the primary instead of retrying
//! - The registry never removes entries, so indices stay valid forever

use std::sync::Arc;

pub mod connection;
pub mod registry;
pub mod round_robin;

pub use connection::{Connection, Role};
pub use registry::{ReplicaRegistry, Snapshot};
pub use round_robin::RoundRobin;

/// Anything whose liveness the selector can inspect.
pub trait Readiness {
    fn is_ready(&self) -> bool;
}

/// Replica selection strategy.
pub trait LoadBalancer<T: Readiness>: Send + Sync {
    /// Pick a replica given the cached healthy count. `None` means the
    /// caller should use the primary.
    fn next_replica(&self, healthy: usize, replicas: &Snapshot<T>) -> Option<Arc<T>>;
}
