//! Round-robin replica selection.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::load_balancer::{LoadBalancer, Readiness, Snapshot};

/// Round-robin selector.
/// Stores a shared cursor that advances once per read.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicU32,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn starting_at(cursor: u32) -> Self {
        Self {
            cursor: AtomicU32::new(cursor),
        }
    }

    pub fn cursor(&self) -> u32 {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Advance and return the new cursor. At `u32::MAX` it resets to zero
    /// before incrementing.
    pub fn advance(&self) -> u32 {
        let step = |c: u32| if c == u32::MAX { 1 } else { c + 1 };
        let prev = self
            .cursor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| Some(step(c)))
            .unwrap_or_else(|c| c);
        step(prev)
    }
}

impl<T: Readiness> LoadBalancer<T> for RoundRobin {
    fn next_replica(&self, healthy: usize, replicas: &Snapshot<T>) -> Option<Arc<T>> {
        if healthy == 0 {
            return None;
        }

        let target = self.advance() as usize % healthy;
        // Counts may be stale; a short scan means readiness changed under us.
        replicas
            .iter()
            .filter(|replica| replica.is_ready())
            .nth(target)
            .cloned()
    }
}
