//! Shutdown coordination for the health monitor.

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Single-use stop signal.
///
/// Holds the sending half of a oneshot channel; the receiving half goes to
/// the background task that should stop.
#[derive(Debug)]
pub struct Shutdown {
    tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl Shutdown {
    /// Create a coordinator and the receiver the task listens on.
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let shutdown = Self {
            tx: Mutex::new(Some(tx)),
        };
        (shutdown, rx)
    }

    /// Fire the signal. Returns false if it was already fired.
    pub fn trigger(&self) -> bool {
        match self.tx.lock().take() {
            Some(tx) => {
                // The receiver may already be gone if the task ended early.
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.lock().is_none()
    }
}
