//! Persistence Module
//!
//! Point-in-time snapshots of the keyspace: a periodic dump while the
//! server runs, one more at shutdown, and a load at startup.
//!
//! ## Example
//!
//! ```ignore
//! use snapkv::persistence::PersistenceManager;
//! use snapkv::storage::Keyspace;
//! use std::sync::Arc;
//!
//! let keyspace = Arc::new(Keyspace::new());
//! let manager = PersistenceManager::new(Arc::clone(&keyspace), "dump.snapkv");
//!
//! manager.load().await?;
//! // ...
//! manager.dump().await?;
//! ```

pub mod manager;
pub mod snapshot;

pub use manager::PersistenceManager;
pub use snapshot::PersistenceError;
