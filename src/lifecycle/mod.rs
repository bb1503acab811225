//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     DbProxy::close → trigger once → health monitor loop exits
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary calls DbProxy::close
//! ```
//!
//! # Design Decisions
//! - The stop signal is a oneshot; triggering it again is a no-op
//! - Ordered shutdown: stop the monitor, close replicas, close the primary

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
