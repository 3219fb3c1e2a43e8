//! Server configuration.
//!
//! Parsed from the command line with clap; [`ServerConfig::default`] gives
//! the same values as running with no arguments, which is what tests use.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Default snapshot file name, relative to the working directory.
pub const DEFAULT_SNAPSHOT_PATH: &str = "dump.snapkv";

/// Default seconds between periodic snapshots.
pub const DEFAULT_SAVE_INTERVAL_SECS: u64 = 300;

/// Default milliseconds open connections get to finish at shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2000;

#[derive(Debug, Clone, Parser)]
#[command(name = "snapkv-server", version, about = "SnapKV: a Redis-compatible key-value server with snapshots")]
pub struct ServerConfig {
    /// Port to listen on
    #[arg(value_name = "PORT", default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = crate::DEFAULT_HOST)]
    pub host: String,

    /// Snapshot file, loaded at startup and written periodically and at shutdown
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SNAPSHOT_PATH)]
    pub snapshot: PathBuf,

    /// Seconds between periodic snapshots (0 disables them)
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_SAVE_INTERVAL_SECS)]
    pub save_interval: u64,

    /// Only expire keys lazily, on access
    #[arg(long)]
    pub no_active_expiry: bool,

    /// Milliseconds open connections get to finish at shutdown before they
    /// are dropped
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_SHUTDOWN_GRACE_MS)]
    pub shutdown_grace: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_PORT,
            host: crate::DEFAULT_HOST.to_string(),
            snapshot: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            save_interval: DEFAULT_SAVE_INTERVAL_SECS,
            no_active_expiry: false,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Interval for periodic snapshots, or None when disabled.
    pub fn save_interval(&self) -> Option<Duration> {
        (self.save_interval > 0).then(|| Duration::from_secs(self.save_interval))
    }

    pub fn active_expiry(&self) -> bool {
        !self.no_active_expiry
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace)
    }
}
