//! Connection health state machine.
//!
//! # States
//! ```text
//! Unconnected → Connecting → Ready
//!                          → Unready
//! Ready ⇄ Unready          (health-check tick or explicit ping)
//! any → Closed             (explicit close, terminal)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Lifecycle state of one connection.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Unconnected = 0,
    Connecting = 1,
    Ready = 2,
    Unready = 3,
    Closed = 4,
}

impl ConnectionState {
    pub fn is_ready(self) -> bool {
        self == ConnectionState::Ready
    }
}

impl From<u8> for ConnectionState {
    fn from(val: u8) -> Self {
        match val {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Ready,
            3 => ConnectionState::Unready,
            4 => ConnectionState::Closed,
            _ => ConnectionState::Unconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unconnected => "unconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Unready => "unready",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Replica health derived by the monitor and cached between ticks.
#[derive(Debug, Default)]
pub struct ReplicaHealth {
    healthy: AtomicUsize,
    ticks: AtomicU64,
}

impl ReplicaHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of replicas that passed the last tick.
    pub fn healthy(&self) -> usize {
        self.healthy.load(Ordering::Acquire)
    }

    /// Completed health-check ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub(crate) fn record_tick(&self, healthy: usize) {
        self.healthy.store(healthy, Ordering::Release);
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }
}
