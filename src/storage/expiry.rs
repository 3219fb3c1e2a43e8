//! Background Expiry Sweeper
//!
//! Lazy expiry keeps expired keys invisible, but a key that is never touched
//! again would stay in memory, and in every snapshot, forever. The sweeper
//! periodically removes such keys.
//!
//! The sweeper runs as a Tokio task and:
//! 1. Sleeps for the current interval (default: 100ms)
//! 2. Removes every expired key
//! 3. Halves the interval when many keys expired, doubles it when none did
//!
//! It stops when its handle is dropped or when the server shutdown signal fires.

use crate::storage::Keyspace;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Base interval between sweeps (default: 100ms)
    pub base_interval: Duration,

    /// Minimum interval between sweeps (default: 10ms)
    pub min_interval: Duration,

    /// Maximum interval between sweeps (default: 1s)
    pub max_interval: Duration,

    /// If this fraction of keys expired in one sweep, speed up
    pub speedup_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use snapkv::storage::{Keyspace, ExpirySweeper, ExpiryConfig};
    /// use std::sync::Arc;
    ///
    /// let keyspace = Arc::new(Keyspace::new());
    /// let sweeper = ExpirySweeper::start(keyspace, ExpiryConfig::default());
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start(keyspace: Arc<Keyspace>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(sweeper_loop(keyspace, config, shutdown_rx));

        info!("Background expiry sweeper started");

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the sweeper and waits for the task to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Signals the sweeper to stop without waiting.
    pub fn stop(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.shutdown_tx.send(true);
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    keyspace: Arc<Keyspace>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut current_interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let keys_before = keyspace.len() as u64;
        let expired = keyspace.cleanup_expired();
        let total = keys_before + expired;

        if total == 0 {
            current_interval = (current_interval * 2).min(config.max_interval);
            continue;
        }

        let expiry_rate = expired as f64 / total as f64;
        if expiry_rate > config.speedup_threshold {
            current_interval = (current_interval / 2).max(config.min_interval);
            debug!(
                expired = expired,
                rate = %format!("{:.2}%", expiry_rate * 100.0),
                new_interval_ms = current_interval.as_millis(),
                "High expiry rate, speeding up sweeper"
            );
        } else if expired == 0 {
            current_interval = (current_interval * 2).min(config.max_interval);
            trace!(
                new_interval_ms = current_interval.as_millis(),
                "No expired keys, slowing down sweeper"
            );
        }

        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = keyspace.len(),
                "Expired keys cleaned up"
            );
        }
    }
}
