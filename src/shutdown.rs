//! Cooperative shutdown signal.
//!
//! The server owns a `watch::Sender<bool>`; every long-running task holds a
//! receiver and checks it between units of work.

use tokio::sync::watch;

/// Creates a shutdown channel in the "running" state.
pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolves once shutdown has been requested or the sender is gone.
///
/// Returns immediately if the flag is already set.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resolves_after_signal() {
        let (tx, mut rx) = channel();

        let pending = tokio::time::timeout(Duration::from_millis(20), wait_for_shutdown(&mut rx));
        assert!(pending.await.is_err());

        tx.send(true).unwrap();
        wait_for_shutdown(&mut rx).await;
        // Already set: returns straight away.
        wait_for_shutdown(&mut rx).await;
    }

    #[tokio::test]
    async fn test_resolves_when_sender_dropped() {
        let (tx, mut rx) = channel();
        drop(tx);
        wait_for_shutdown(&mut rx).await;
    }
}
