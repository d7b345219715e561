//! Cooperative cancellation shared by feeds and forwarding tasks

use tokio::sync::watch;

/// Fires the paired [`Shutdown`] signals
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace never fails, even without receivers
        self.tx.send_replace(true);
    }
}

/// Cloneable cancellation signal.
///
/// Dropping the trigger counts as cancellation.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&mut self) {
        // wait_for errs only when the trigger is gone
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}
