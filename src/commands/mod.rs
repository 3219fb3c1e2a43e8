//! Command Handler Module
//!
//! This module implements the command processing layer for SnapKV.
//! It receives parsed RESP commands, executes them against the keyspace,
//! and returns appropriate responses.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Keyspace     │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! ### Server
//! - `PING`, `ECHO`, `QUIT`, `INFO`, `TIME`, `COMMAND`
//! - `DBSIZE`, `FLUSHDB`, `FLUSHALL`
//! - `BGSAVE`, `LASTSAVE`
//!
//! ### Keys
//! - `DEL`, `EXISTS`, `TYPE`, `KEYS`
//! - `EXPIRE`, `PEXPIRE`, `TTL`, `PTTL`, `PERSIST`
//!
//! ### Strings
//! - `SET [EX|PX] [NX|XX]`, `GET`, `MSET`, `MGET`
//! - `INCR`, `INCRBY`, `DECR`, `DECRBY`, `APPEND`, `STRLEN`
//!
//! ### Lists
//! - `LPUSH`, `RPUSH`, `LPOP`, `RPOP`, `LLEN`, `LINDEX`, `LRANGE`
//!
//! ### Hashes
//! - `HSET`, `HGET`, `HDEL`, `HGETALL`, `HEXISTS`, `HLEN`
//!
//! ### Sets
//! - `SADD`, `SREM`, `SMEMBERS`, `SISMEMBER`, `SCARD`

pub mod handler;

mod hashes;
mod lists;
mod sets;
mod strings;

pub use handler::{CommandError, CommandHandler, CommandResult};
