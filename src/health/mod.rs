//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer (first tick one interval after start)
//!     → Ping the primary
//!     → Ping every registered replica in index order
//!     → Store the healthy replica count in state.rs
//!
//! State machine (state.rs):
//!     Unconnected → Connecting → Ready ⇄ Unready → Closed
//! ```
//!
//! # Design Decisions
//! - One probe decides readiness; there are no flap thresholds
//! - Probe failures are logged, never returned
//! - The healthy count only changes on a tick, so selection reads a cached value

pub mod active;
pub mod state;

pub use active::HealthMonitor;
pub use state::{ConnectionState, ReplicaHealth};
