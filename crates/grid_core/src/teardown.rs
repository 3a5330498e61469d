//! Per-view cancellation signal fanned out to every subscription the core creates.

use tokio::sync::watch;

/// Owning side of the signal. Firing it stops all callback delivery from
/// tasks holding a [`TeardownSignal`]; dropping the owner counts as firing.
pub struct Teardown {
    tx: watch::Sender<bool>,
    signal: TeardownSignal,
}

#[derive(Clone)]
pub struct TeardownSignal {
    rx: watch::Receiver<bool>,
}

impl Teardown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx,
            signal: TeardownSignal { rx },
        }
    }

    pub fn signal(&self) -> TeardownSignal {
        self.signal.clone()
    }

    pub fn fire(&self) {
        let _ = self.tx.send(true);
    }
}

impl Default for Teardown {
    fn default() -> Self {
        Self::new()
    }
}

impl TeardownSignal {
    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the owner fires or is dropped.
    pub async fn fired(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }
}
