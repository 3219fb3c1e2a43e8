//! # SnapKV - An In-Memory Key-Value Server with Snapshots
//!
//! SnapKV speaks the Redis Serialization Protocol (RESP), stores strings,
//! lists, hashes and sets with optional per-key expiry, and survives
//! restarts by writing point-in-time snapshots to disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               SnapKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Server    │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │   RESP      │    │                 Keyspace                     │   │
//! │  │   Parser    │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │   │
//! │  │             │    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...64   │ │   │
//! │  └─────────────┘    │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │ │   │
//! │                     │  └────────┘ └────────┘ └────────┘ └────────┘ │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                            ▲                          ▲                 │
//! │              ┌─────────────┴──────┐        ┌──────────┴─────────┐       │
//! │              │   ExpirySweeper    │        │ PersistenceManager │       │
//! │              │   (Tokio task)     │        │ (periodic dumps)   │       │
//! │              └────────────────────┘        └────────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use snapkv::{Server, ServerConfig};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::default();
//!     let listener = TcpListener::bind(config.bind_address()).await?;
//!
//!     let shutdown = async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     };
//!     Server::new(config).run(listener, shutdown).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP parser and value type
//! - [`storage`]: the sharded keyspace, lazy expiry and the background sweeper
//! - [`commands`]: command dispatch and every supported command
//! - [`connection`]: per-client read/execute/reply loop
//! - [`persistence`]: snapshot format, dumps and loads
//! - [`server`]: accept loop and the shutdown sequence
//! - [`client`]: async client used by `snapkv-cli`
//!
//! ## Design Highlights
//!
//! ### Thread Safety
//!
//! The keyspace is split over 64 independent RwLocks. Every command is
//! atomic with respect to its key; no lock is held across I/O.
//!
//! ### Lazy + Active Expiry
//!
//! A key past its deadline is dropped by the first operation that touches
//! it, so it is never observable. A background sweeper also removes keys
//! nobody touches, which keeps them out of memory and out of snapshots.
//!
//! ### Snapshots
//!
//! A snapshot copies the keyspace shard by shard, encodes it off-lock and
//! replaces the previous file with an atomic rename.

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod storage;

// Re-export commonly used types for convenience
pub use client::{Client, ClientError};
pub use commands::{CommandError, CommandHandler};
pub use config::ServerConfig;
pub use connection::{handle_connection, ConnectionStats};
pub use persistence::{PersistenceError, PersistenceManager};
pub use protocol::{ParseError, RespParser, RespValue};
pub use server::Server;
pub use storage::{ExpiryConfig, ExpirySweeper, Keyspace, StorageError};

/// The default port SnapKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host SnapKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of SnapKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
