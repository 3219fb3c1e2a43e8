//! Snapshot manager
//!
//! Owns the snapshot path and serializes dumps. A dump copies the keyspace
//! under short per-shard read locks, encodes it off-lock, writes
//! `<path>.tmp`, syncs it and renames it over the previous snapshot, so a
//! crash mid-write never leaves a half-written snapshot behind.

use crate::persistence::snapshot::{self, PersistenceError};
use crate::shutdown::wait_for_shutdown;
use crate::storage::Keyspace;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Writes and loads snapshots of a [`Keyspace`].
#[derive(Debug)]
pub struct PersistenceManager {
    keyspace: Arc<Keyspace>,
    path: PathBuf,
    /// Held for the duration of a dump; at most one runs at a time
    dump_lock: Mutex<()>,
    /// Unix seconds of the last successful dump (0 = never)
    last_save: AtomicU64,
}

impl PersistenceManager {
    pub fn new(keyspace: Arc<Keyspace>, path: impl Into<PathBuf>) -> Self {
        Self {
            keyspace,
            path: path.into(),
            dump_lock: Mutex::new(()),
            last_save: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unix time in seconds of the last successful dump, 0 if none yet.
    pub fn last_save(&self) -> u64 {
        self.last_save.load(Ordering::Relaxed)
    }

    /// True while a dump is being written.
    pub fn is_dumping(&self) -> bool {
        self.dump_lock.try_lock().is_err()
    }

    /// Writes a snapshot of every live key.
    ///
    /// Returns the number of records written. Concurrent calls queue up
    /// behind each other.
    pub async fn dump(&self) -> Result<usize, PersistenceError> {
        let _guard = self.dump_lock.lock().await;

        let entries = self.keyspace.snapshot();
        let image = snapshot::encode(&entries)?;
        let tmp = tmp_path(&self.path);

        let written = match write_synced(&tmp, &image).await {
            Ok(()) => tokio::fs::rename(&tmp, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        self.last_save
            .store(snapshot::unix_millis() / 1000, Ordering::Relaxed);
        info!(
            path = %self.path.display(),
            keys = entries.len(),
            bytes = image.len(),
            "Snapshot written"
        );
        Ok(entries.len())
    }

    /// Loads the snapshot into the keyspace.
    ///
    /// The file is fully decoded before any key is inserted, so a corrupt
    /// file leaves the keyspace untouched. Returns the number of keys restored.
    pub async fn load(&self) -> Result<usize, PersistenceError> {
        let image = match tokio::fs::read(&self.path).await {
            Ok(image) => image,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PersistenceError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let entries = snapshot::decode(&image)?;
        let restored = self.keyspace.restore(entries);
        info!(path = %self.path.display(), keys = restored, "Snapshot loaded");
        Ok(restored)
    }

    /// Starts a dump on a background task (`BGSAVE`).
    pub fn spawn_dump(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = manager.dump().await {
                error!(error = %e, "Background snapshot failed");
            }
        })
    }

    /// Dumps every `interval` until the shutdown signal fires.
    ///
    /// A failed dump is logged and retried on the next tick. A dump that is
    /// already running when shutdown fires is allowed to finish.
    pub fn start_periodic(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "Periodic snapshots enabled");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = manager.dump().await {
                            warn!(error = %e, "Periodic snapshot failed, retrying next interval");
                        }
                    }
                    _ = wait_for_shutdown(&mut shutdown) => {
                        debug!("Periodic snapshot task stopping");
                        return;
                    }
                }
            }
        })
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}
