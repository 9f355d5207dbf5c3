//! Hot-swappable configuration with change notification.
//!
//! Readers take a cheap `Arc` snapshot that stays valid while a reload swaps
//! in a new value; long-running loops hold a [`ConfigWatcher`] to react to
//! reloads without polling.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared configuration value of type `T`.
pub struct ConfigStore<T> {
    tx: Arc<watch::Sender<Arc<T>>>,
}

/// Wakes when the owning [`ConfigStore`] is replaced.
pub struct ConfigWatcher<T> {
    rx: watch::Receiver<Arc<T>>,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// The value in force right now.
    pub fn current(&self) -> Arc<T> {
        self.tx.borrow().clone()
    }

    /// Swap in a new value and wake every watcher.
    pub fn replace(&self, value: T) {
        self.tx.send_replace(Arc::new(value));
    }

    pub fn subscribe(&self) -> ConfigWatcher<T> {
        ConfigWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> ConfigWatcher<T> {
    /// Wait for the next replacement and return the new value.
    ///
    /// Errors once every [`ConfigStore`] handle has been dropped.
    pub async fn changed(&mut self) -> Result<Arc<T>, watch::error::RecvError> {
        self.rx.changed().await?;
        Ok(self.rx.borrow_and_update().clone())
    }
}
