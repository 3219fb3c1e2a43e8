//! Value model for the keyspace.
//!
//! Every key holds exactly one of four value types. Commands that expect a
//! different type fail with [`StorageError::WrongType`] instead of coercing.

use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors raised by keyspace operations.
///
/// The messages are the exact RESP error strings sent back to clients.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR increment or decrement would overflow")]
    Overflow,
}

/// A typed value stored under a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(Bytes),
    /// Deque for O(1) push/pop on both ends
    List(VecDeque<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    Set(HashSet<Bytes>),
}

impl Value {
    /// The name reported by the `TYPE` command.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
        }
    }

    /// Collections are dropped from the keyspace once they become empty.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
        }
    }

    pub fn as_string(&self) -> Result<&Bytes, StorageError> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(StorageError::WrongType),
        }
    }

    pub fn as_list(&self) -> Result<&VecDeque<Bytes>, StorageError> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(StorageError::WrongType),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut VecDeque<Bytes>, StorageError> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(StorageError::WrongType),
        }
    }

    pub fn as_hash(&self) -> Result<&HashMap<Bytes, Bytes>, StorageError> {
        match self {
            Value::Hash(h) => Ok(h),
            _ => Err(StorageError::WrongType),
        }
    }

    pub fn as_hash_mut(&mut self) -> Result<&mut HashMap<Bytes, Bytes>, StorageError> {
        match self {
            Value::Hash(h) => Ok(h),
            _ => Err(StorageError::WrongType),
        }
    }

    pub fn as_set(&self) -> Result<&HashSet<Bytes>, StorageError> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(StorageError::WrongType),
        }
    }

    pub fn as_set_mut(&mut self) -> Result<&mut HashSet<Bytes>, StorageError> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(StorageError::WrongType),
        }
    }
}

/// A stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Value,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    pub fn with_ttl(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Some(Instant::now() + ttl),
        }
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Remaining time to live, or None if no expiry is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(Instant::now()))
    }
}

/// Result of a TTL query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Key exists and expires after this duration.
    Remaining(Duration),
    /// Key exists but has no expiry.
    Persistent,
    /// Key does not exist.
    Missing,
}

impl Ttl {
    /// Seconds in Redis reply form: -2 missing, -1 persistent.
    ///
    /// Remaining time is rounded to the nearest second.
    pub fn as_secs_reply(&self) -> i64 {
        match self {
            Ttl::Remaining(d) => ((d.as_millis() + 500) / 1000) as i64,
            Ttl::Persistent => -1,
            Ttl::Missing => -2,
        }
    }

    pub fn as_millis_reply(&self) -> i64 {
        match self {
            Ttl::Remaining(d) => d.as_millis() as i64,
            Ttl::Persistent => -1,
            Ttl::Missing => -2,
        }
    }
}
