//! Storage Module
//!
//! The shared in-memory keyspace, its typed value model and the background
//! expiry sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Keyspace                             │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!            ▲                                  ▲
//!            │                                  │
//!  ┌─────────┴─────────┐              ┌─────────┴─────────┐
//!  │   ExpirySweeper   │              │ PersistenceManager│
//!  │  (Tokio task)     │              │  (Tokio task)     │
//!  └───────────────────┘              └───────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use snapkv::storage::{Keyspace, SetCondition, StorageError};
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let keyspace = Keyspace::new();
//!
//! keyspace.set(Bytes::from("name"), Bytes::from("Ariz"));
//! assert_eq!(keyspace.get(b"name").unwrap(), Some(Bytes::from("Ariz")));
//!
//! keyspace.set_with(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Some(Duration::from_secs(3600)),
//!     SetCondition::Always,
//! );
//!
//! assert_eq!(keyspace.incr_by(b"name", 1), Err(StorageError::NotInteger));
//! ```

pub mod expiry;
pub mod keyspace;
pub mod pattern;
pub mod types;

pub use expiry::{ExpiryConfig, ExpirySweeper};
pub use keyspace::{Keyspace, KeyspaceStats, SetCondition};
pub use types::{Entry, StorageError, Ttl, Value};
