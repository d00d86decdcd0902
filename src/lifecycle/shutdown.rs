//! Shutdown coordination.
//!
//! A trigger is sticky: a [`ShutdownSignal`] taken after the trigger still
//! resolves immediately, and dropping the [`Shutdown`] releases every
//! waiter.

use tokio::sync::watch;

pub struct Shutdown {
    triggered: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (triggered, _) = watch::channel(false);
        Self { triggered }
    }

    /// Signal handed to the server and background tasks.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            triggered: self.triggered.subscribe(),
        }
    }

    pub fn trigger(&self) {
        self.triggered.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.triggered.borrow()
    }

    /// Trigger once SIGINT or SIGTERM arrives.
    pub async fn trigger_on_signal(&self) {
        super::signals::wait_for_signal().await;
        self.trigger();
    }

    /// Number of signals still held by running tasks.
    pub fn waiters(&self) -> usize {
        self.triggered.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of [`Shutdown`].
#[derive(Clone)]
pub struct ShutdownSignal {
    triggered: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown is triggered or the coordinator is gone.
    pub async fn wait(mut self) {
        while !*self.triggered.borrow_and_update() {
            if self.triggered.changed().await.is_err() {
                return;
            }
        }
    }
}
