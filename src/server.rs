//! TCP server: accept loop, background jobs and the shutdown sequence.
//!
//! ```text
//! startup:   load snapshot ─> start sweeper ─> start periodic dumps ─> accept
//! shutdown:  stop accepting ─> drain connections (bounded by the grace
//!            period, then aborted) ─> stop periodic dumps ─> stop sweeper
//!            ─> final dump
//! ```

use crate::commands::CommandHandler;
use crate::config::ServerConfig;
use crate::connection::{handle_connection, ConnectionStats};
use crate::persistence::{PersistenceError, PersistenceManager};
use crate::shutdown;
use crate::storage::{ExpiryConfig, ExpirySweeper, Keyspace};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// A configured server, ready to run on a bound listener.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    keyspace: Arc<Keyspace>,
    persistence: Arc<PersistenceManager>,
    stats: Arc<ConnectionStats>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let keyspace = Arc::new(Keyspace::new());
        let persistence = Arc::new(PersistenceManager::new(
            Arc::clone(&keyspace),
            config.snapshot.clone(),
        ));

        Self {
            config,
            keyspace,
            persistence,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    pub fn keyspace(&self) -> &Arc<Keyspace> {
        &self.keyspace
    }

    pub fn persistence(&self) -> &Arc<PersistenceManager> {
        &self.persistence
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Loads the snapshot, if any. Failure is logged and the server starts empty.
    pub async fn load_snapshot(&self) -> usize {
        match self.persistence.load().await {
            Ok(restored) => restored,
            Err(PersistenceError::NotFound(path)) => {
                info!(path = %path.display(), "No snapshot found, starting empty");
                0
            }
            Err(e) => {
                error!(
                    path = %self.persistence.path().display(),
                    error = %e,
                    "Failed to load snapshot, starting empty"
                );
                0
            }
        }
    }

    /// Serves clients on `listener` until `signal` resolves, then shuts down.
    ///
    /// Returns the outcome of the final snapshot.
    pub async fn run(
        self,
        listener: TcpListener,
        signal: impl Future<Output = ()>,
    ) -> Result<usize, PersistenceError> {
        self.load_snapshot().await;

        let (shutdown_tx, shutdown_rx) = shutdown::channel();

        let sweeper = self
            .config
            .active_expiry()
            .then(|| ExpirySweeper::start(Arc::clone(&self.keyspace), ExpiryConfig::default()));

        let saver = self
            .config
            .save_interval()
            .map(|interval| self.persistence.start_periodic(interval, shutdown_rx.clone()));

        let handler = CommandHandler::new(Arc::clone(&self.keyspace))
            .with_persistence(Arc::clone(&self.persistence))
            .with_stats(Arc::clone(&self.stats));

        match listener.local_addr() {
            Ok(addr) => info!(addr = %addr, "Ready to accept connections"),
            Err(e) => warn!(error = %e, "Listening on unknown address"),
        }

        let mut connections = JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        connections.spawn(handle_connection(
                            stream,
                            addr,
                            handler.clone(),
                            Arc::clone(&self.stats),
                            shutdown_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        warn!(error = %e, "Connection task failed");
                    }
                }
                _ = &mut signal => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        drop(listener);
        let _ = shutdown_tx.send(true);

        let open = connections.len();
        if open > 0 {
            info!(connections = open, "Waiting for connections to close");
        }
        let drained = tokio::time::timeout(self.config.shutdown_grace(), async {
            while let Some(finished) = connections.join_next().await {
                if let Err(e) = finished {
                    warn!(error = %e, "Connection task failed");
                }
            }
        })
        .await;

        // A client that stops reading can park its task in a write forever.
        if drained.is_err() {
            warn!(
                connections = connections.len(),
                "Connections still open after grace period, dropping them"
            );
            connections.abort_all();
            while connections.join_next().await.is_some() {}
        }

        if let Some(saver) = saver {
            let _ = saver.await;
        }
        if let Some(sweeper) = sweeper {
            sweeper.shutdown().await;
        }

        let result = self.persistence.dump().await;
        match &result {
            Ok(keys) => info!(keys = keys, "Final snapshot written"),
            Err(e) => error!(error = %e, "Final snapshot failed"),
        }
        info!("Server shutdown complete");
        result
    }
}
