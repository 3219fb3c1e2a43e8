//! Thread-Safe Keyspace with Expiry Support
//!
//! The keyspace maps keys to typed [`Entry`] values and is shared by every
//! connection task, the snapshot task and the expiry sweeper.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys are hashed onto 64 shards, each behind its own
//!    `RwLock`, so writers to different keys rarely contend.
//! 2. **Lazy Expiry**: Every operation first drops its target key if the key
//!    has expired, then reads or mutates it. A key past its deadline is never
//!    observable.
//! 3. **Short Critical Sections**: A lock is held only for the in-memory
//!    read or mutation of one key. No I/O ever happens under a shard lock.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Keyspace                             │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::storage::pattern::glob_match;
use crate::storage::types::{Entry, StorageError, Ttl, Value};
use bytes::{Bytes, BytesMut};
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Number of shards for the keyspace.
const NUM_SHARDS: usize = 64;

type ShardMap = HashMap<Bytes, Entry>;

#[derive(Debug, Default)]
struct Shard {
    data: RwLock<ShardMap>,
}

impl Shard {
    // Every mutation is a single map operation, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, ShardMap> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ShardMap> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write behaviour for `SET` with `NX` / `XX`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SetCondition {
    #[default]
    Always,
    /// NX: only set if the key does not exist
    IfMissing,
    /// XX: only set if the key already exists
    IfExists,
}

/// Aggregated keyspace statistics for `INFO`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyspaceStats {
    pub keys: usize,
    pub keys_with_expiry: usize,
    /// Total keys removed because they expired (lazily or by the sweeper)
    pub expired: u64,
}

/// The in-memory key-value store.
///
/// Designed to be wrapped in an `Arc` and shared across tasks. All
/// operations are thread-safe and atomic per key.
///
/// # Example
///
/// ```
/// use snapkv::storage::Keyspace;
/// use bytes::Bytes;
///
/// let keyspace = Keyspace::new();
/// keyspace.set(Bytes::from("name"), Bytes::from("Ariz"));
/// assert_eq!(keyspace.get(b"name").unwrap(), Some(Bytes::from("Ariz")));
///
/// keyspace.rpush(Bytes::from("queue"), vec![Bytes::from("a")]).unwrap();
/// assert!(keyspace.get(b"queue").is_err());
/// ```
pub struct Keyspace {
    shards: Vec<Shard>,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyspace")
            .field("shards", &self.shards.len())
            .field("keys", &self.len())
            .finish()
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Locks the key's shard for writing, dropping the key first if it has expired.
    fn write_live(&self, key: &[u8]) -> RwLockWriteGuard<'_, ShardMap> {
        let mut data = self.shard(key).write();
        if data.get(key).is_some_and(Entry::is_expired) {
            data.remove(key);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
        }
        data
    }

    /// Runs `f` against the live entry for `key` under a read lock.
    ///
    /// An expired entry is purged under the write lock and reported as absent.
    fn read_live<R>(&self, key: &[u8], f: impl FnOnce(&Entry) -> R) -> Option<R> {
        {
            let data = self.shard(key).read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(f(entry)),
                Some(_) => {}
                None => return None,
            }
        }

        drop(self.write_live(key));
        None
    }

    // ========================================================================
    // Key operations
    // ========================================================================

    /// Deletes a key. Returns `true` if a live key was removed.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.write_live(key).remove(key).is_some()
    }

    /// Deletes several keys, each atomically; the batch is not atomic.
    pub fn delete_many(&self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|key| self.delete(key)).count() as u64
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.read_live(key, |_| ()).is_some()
    }

    /// Counts how many of the given keys exist (duplicates count twice).
    pub fn exists_many(&self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|key| self.exists(key)).count() as u64
    }

    /// Sets an expiry on an existing key. Returns `false` if the key is absent.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> bool {
        let mut data = self.write_live(key);
        match data.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }
    }

    /// Removes the expiry from a key. Returns `true` only if one was removed.
    pub fn persist(&self, key: &[u8]) -> bool {
        let mut data = self.write_live(key);
        data.get_mut(key)
            .and_then(|entry| entry.expires_at.take())
            .is_some()
    }

    pub fn ttl(&self, key: &[u8]) -> Ttl {
        self.read_live(key, |entry| match entry.remaining() {
            Some(remaining) => Ttl::Remaining(remaining),
            None => Ttl::Persistent,
        })
        .unwrap_or(Ttl::Missing)
    }

    /// The `TYPE` of a key: "string", "list", "hash", "set" or "none".
    pub fn key_type(&self, key: &[u8]) -> &'static str {
        self.read_live(key, |entry| entry.value.type_name())
            .unwrap_or("none")
    }

    /// Returns all live keys matching a glob pattern.
    ///
    /// **Warning**: This scans every shard.
    pub fn keys(&self, pattern: &[u8]) -> Vec<Bytes> {
        let now = Instant::now();
        let mut result = Vec::new();
        for shard in &self.shards {
            let data = shard.read();
            result.extend(
                data.iter()
                    .filter(|(key, entry)| !entry.is_expired_at(now) && glob_match(pattern, key))
                    .map(|(key, _)| key.clone()),
            );
        }
        result.sort();
        result
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .read()
                    .values()
                    .filter(|entry| !entry.is_expired_at(now))
                    .count()
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every key (`FLUSHDB`).
    pub fn flush(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
    }

    /// Removes every expired key from every shard.
    ///
    /// Returns the number of keys removed.
    pub fn cleanup_expired(&self) -> u64 {
        let mut cleaned = 0u64;
        for shard in &self.shards {
            let now = Instant::now();
            let mut data = shard.write();
            let before = data.len();
            data.retain(|_, entry| !entry.is_expired_at(now));
            cleaned += (before - data.len()) as u64;
        }

        if cleaned > 0 {
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }
        cleaned
    }

    pub fn stats(&self) -> KeyspaceStats {
        let now = Instant::now();
        let mut stats = KeyspaceStats {
            expired: self.expired_count.load(Ordering::Relaxed),
            ..Default::default()
        };
        for shard in &self.shards {
            for entry in shard.read().values().filter(|e| !e.is_expired_at(now)) {
                stats.keys += 1;
                if entry.expires_at.is_some() {
                    stats.keys_with_expiry += 1;
                }
            }
        }
        stats
    }

    // ========================================================================
    // String operations
    // ========================================================================

    /// Returns the string stored at `key`, or None if absent or expired.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StorageError> {
        self.read_live(key, |entry| entry.value.as_string().cloned())
            .transpose()
    }

    /// Stores a string without expiry, replacing any previous value and TTL.
    pub fn set(&self, key: Bytes, value: Bytes) {
        self.set_with(key, value, None, SetCondition::Always);
    }

    /// Stores a string with an optional TTL and an NX/XX condition.
    ///
    /// Returns `false` if the condition prevented the write.
    pub fn set_with(
        &self,
        key: Bytes,
        value: Bytes,
        ttl: Option<Duration>,
        condition: SetCondition,
    ) -> bool {
        let mut data = self.write_live(&key);
        let exists = data.contains_key(&key);
        match condition {
            SetCondition::IfMissing if exists => return false,
            SetCondition::IfExists if !exists => return false,
            _ => {}
        }

        let value = Value::String(value);
        let entry = match ttl {
            Some(ttl) => Entry::with_ttl(value, ttl),
            None => Entry::new(value),
        };
        data.insert(key, entry);
        true
    }

    /// Returns the strings for several keys; non-strings read as None.
    pub fn mget(&self, keys: &[Bytes]) -> Vec<Option<Bytes>> {
        keys.iter()
            .map(|key| self.get(key).ok().flatten())
            .collect()
    }

    /// Adds `delta` to the integer stored at `key`, creating it at 0.
    ///
    /// The stored value is left untouched when it is not an integer or the
    /// result would overflow. An existing TTL is kept.
    pub fn incr_by(&self, key: &[u8], delta: i64) -> Result<i64, StorageError> {
        let mut data = self.write_live(key);

        let current = match data.get(key) {
            Some(entry) => parse_integer(entry.value.as_string()?)?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(StorageError::Overflow)?;
        let value = Value::String(Bytes::from(next.to_string()));

        match data.get_mut(key) {
            Some(entry) => entry.value = value,
            None => {
                data.insert(Bytes::copy_from_slice(key), Entry::new(value));
            }
        }
        Ok(next)
    }

    pub fn decr_by(&self, key: &[u8], delta: i64) -> Result<i64, StorageError> {
        self.incr_by(key, delta.checked_neg().ok_or(StorageError::Overflow)?)
    }

    /// Appends to a string, creating it if absent. Returns the new length.
    pub fn append(&self, key: &[u8], suffix: &[u8]) -> Result<usize, StorageError> {
        let mut data = self.write_live(key);
        match data.get_mut(key) {
            Some(entry) => {
                let current = entry.value.as_string()?;
                let mut joined = BytesMut::with_capacity(current.len() + suffix.len());
                joined.extend_from_slice(current);
                joined.extend_from_slice(suffix);
                let len = joined.len();
                entry.value = Value::String(joined.freeze());
                Ok(len)
            }
            None => {
                let value = Bytes::copy_from_slice(suffix);
                data.insert(Bytes::copy_from_slice(key), Entry::new(Value::String(value)));
                Ok(suffix.len())
            }
        }
    }

    pub fn strlen(&self, key: &[u8]) -> Result<usize, StorageError> {
        self.read_live(key, |entry| entry.value.as_string().map(Bytes::len))
            .transpose()
            .map(Option::unwrap_or_default)
    }

    // ========================================================================
    // List operations
    // ========================================================================

    /// Pushes values onto the head of a list, one at a time, so the last
    /// value ends up first. Returns the new length.
    pub fn lpush(&self, key: Bytes, values: Vec<Bytes>) -> Result<usize, StorageError> {
        self.push(key, values, true)
    }

    /// Pushes values onto the tail of a list. Returns the new length.
    pub fn rpush(&self, key: Bytes, values: Vec<Bytes>) -> Result<usize, StorageError> {
        self.push(key, values, false)
    }

    fn push(&self, key: Bytes, values: Vec<Bytes>, front: bool) -> Result<usize, StorageError> {
        let mut data = self.write_live(&key);
        if values.is_empty() {
            return match data.get(&key) {
                Some(entry) => entry.value.as_list().map(VecDeque::len),
                None => Ok(0),
            };
        }

        let entry = data
            .entry(key)
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        let list = entry.value.as_list_mut()?;
        for value in values {
            if front {
                list.push_front(value);
            } else {
                list.push_back(value);
            }
        }
        Ok(list.len())
    }

    pub fn lpop(&self, key: &[u8]) -> Result<Option<Bytes>, StorageError> {
        self.pop(key, true)
    }

    pub fn rpop(&self, key: &[u8]) -> Result<Option<Bytes>, StorageError> {
        self.pop(key, false)
    }

    fn pop(&self, key: &[u8], front: bool) -> Result<Option<Bytes>, StorageError> {
        let mut data = self.write_live(key);
        let Some(entry) = data.get_mut(key) else {
            return Ok(None);
        };

        let list = entry.value.as_list_mut()?;
        let popped = if front {
            list.pop_front()
        } else {
            list.pop_back()
        };
        let now_empty = list.is_empty();

        if now_empty {
            data.remove(key);
        }
        Ok(popped)
    }

    pub fn llen(&self, key: &[u8]) -> Result<usize, StorageError> {
        self.read_live(key, |entry| entry.value.as_list().map(VecDeque::len))
            .transpose()
            .map(Option::unwrap_or_default)
    }

    /// Element at `index`; negative indexes count from the tail.
    pub fn lindex(&self, key: &[u8], index: i64) -> Result<Option<Bytes>, StorageError> {
        self.read_live(key, |entry| {
            let list = entry.value.as_list()?;
            let len = list.len() as i64;
            let index = if index < 0 { len + index } else { index };
            if index < 0 || index >= len {
                return Ok(None);
            }
            Ok(list.get(index as usize).cloned())
        })
        .transpose()
        .map(Option::flatten)
    }

    /// Inclusive range with negative indexes counted from the tail,
    /// clamped to the list bounds.
    pub fn lrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Bytes>, StorageError> {
        self.read_live(key, |entry| {
            let list = entry.value.as_list()?;
            let len = list.len() as i64;

            let start = if start < 0 { (len + start).max(0) } else { start };
            let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
            if start > stop || start >= len {
                return Ok(Vec::new());
            }

            Ok(list
                .range(start as usize..=stop as usize)
                .cloned()
                .collect())
        })
        .transpose()
        .map(Option::unwrap_or_default)
    }

    // ========================================================================
    // Hash operations
    // ========================================================================

    /// Upserts hash fields. Returns how many fields were newly created.
    pub fn hset(&self, key: Bytes, pairs: Vec<(Bytes, Bytes)>) -> Result<usize, StorageError> {
        let mut data = self.write_live(&key);
        let entry = data
            .entry(key)
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
        let hash = entry.value.as_hash_mut()?;

        let mut created = 0;
        for (field, value) in pairs {
            if hash.insert(field, value).is_none() {
                created += 1;
            }
        }
        Ok(created)
    }

    pub fn hget(&self, key: &[u8], field: &[u8]) -> Result<Option<Bytes>, StorageError> {
        self.read_live(key, |entry| {
            entry
                .value
                .as_hash()
                .map(|hash| hash.get(field).cloned())
        })
        .transpose()
        .map(Option::flatten)
    }

    /// Removes hash fields. Returns how many existed.
    pub fn hdel(&self, key: &[u8], fields: &[Bytes]) -> Result<usize, StorageError> {
        let mut data = self.write_live(key);
        let Some(entry) = data.get_mut(key) else {
            return Ok(0);
        };

        let hash = entry.value.as_hash_mut()?;
        let removed = fields
            .iter()
            .filter(|field| hash.remove(&field[..]).is_some())
            .count();
        let now_empty = hash.is_empty();

        if now_empty {
            data.remove(key);
        }
        Ok(removed)
    }

    /// All field/value pairs, sorted by field.
    pub fn hgetall(&self, key: &[u8]) -> Result<Vec<(Bytes, Bytes)>, StorageError> {
        self.read_live(key, |entry| {
            entry.value.as_hash().map(|hash| {
                let mut pairs: Vec<_> = hash
                    .iter()
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect();
                pairs.sort();
                pairs
            })
        })
        .transpose()
        .map(Option::unwrap_or_default)
    }

    pub fn hexists(&self, key: &[u8], field: &[u8]) -> Result<bool, StorageError> {
        self.read_live(key, |entry| {
            entry.value.as_hash().map(|hash| hash.contains_key(field))
        })
        .transpose()
        .map(Option::unwrap_or_default)
    }

    pub fn hlen(&self, key: &[u8]) -> Result<usize, StorageError> {
        self.read_live(key, |entry| entry.value.as_hash().map(HashMap::len))
            .transpose()
            .map(Option::unwrap_or_default)
    }

    // ========================================================================
    // Set operations
    // ========================================================================

    /// Adds members to a set. Returns how many were not already present.
    pub fn sadd(&self, key: Bytes, members: Vec<Bytes>) -> Result<usize, StorageError> {
        let mut data = self.write_live(&key);
        let entry = data
            .entry(key)
            .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));
        let set = entry.value.as_set_mut()?;
        Ok(members
            .into_iter()
            .filter(|member| set.insert(member.clone()))
            .count())
    }

    /// Removes members from a set. Returns how many were present.
    pub fn srem(&self, key: &[u8], members: &[Bytes]) -> Result<usize, StorageError> {
        let mut data = self.write_live(key);
        let Some(entry) = data.get_mut(key) else {
            return Ok(0);
        };

        let set = entry.value.as_set_mut()?;
        let removed = members
            .iter()
            .filter(|member| set.remove(&member[..]))
            .count();
        let now_empty = set.is_empty();

        if now_empty {
            data.remove(key);
        }
        Ok(removed)
    }

    /// All members, sorted.
    pub fn smembers(&self, key: &[u8]) -> Result<Vec<Bytes>, StorageError> {
        self.read_live(key, |entry| {
            entry.value.as_set().map(|set| {
                let mut members: Vec<_> = set.iter().cloned().collect();
                members.sort();
                members
            })
        })
        .transpose()
        .map(Option::unwrap_or_default)
    }

    pub fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool, StorageError> {
        self.read_live(key, |entry| entry.value.as_set().map(|set| set.contains(member)))
            .transpose()
            .map(Option::unwrap_or_default)
    }

    pub fn scard(&self, key: &[u8]) -> Result<usize, StorageError> {
        self.read_live(key, |entry| entry.value.as_set().map(HashSet::len))
            .transpose()
            .map(Option::unwrap_or_default)
    }

    // ========================================================================
    // Snapshot support
    // ========================================================================

    /// Copies every live entry.
    ///
    /// Each shard is copied under its read lock, so every entry is a value
    /// some single write produced. Writes to other shards may land between
    /// shard copies.
    pub fn snapshot(&self) -> Vec<(Bytes, Entry)> {
        let mut entries = Vec::new();
        for shard in &self.shards {
            let now = Instant::now();
            let data = shard.read();
            entries.extend(
                data.iter()
                    .filter(|(_, entry)| !entry.is_expired_at(now))
                    .map(|(key, entry)| (key.clone(), entry.clone())),
            );
        }
        entries
    }

    /// Inserts entries loaded from a snapshot, skipping expired ones and
    /// empty collections. Returns the number inserted.
    pub fn restore(&self, entries: impl IntoIterator<Item = (Bytes, Entry)>) -> usize {
        let now = Instant::now();
        let mut restored = 0;
        for (key, entry) in entries {
            if entry.is_expired_at(now) || entry.value.is_empty_collection() {
                continue;
            }
            self.shard(&key).write().insert(key, entry);
            restored += 1;
        }
        restored
    }
}

fn parse_integer(bytes: &[u8]) -> Result<i64, StorageError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(StorageError::NotInteger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_set_and_get() {
        let ks = Keyspace::new();
        ks.set(b("key"), b("value"));
        assert_eq!(ks.get(b"key").unwrap(), Some(b("value")));
        assert_eq!(ks.get(b"missing").unwrap(), None);
    }

    #[test]
    fn test_set_replaces_type_and_ttl() {
        let ks = Keyspace::new();
        ks.rpush(b("k"), vec![b("a")]).unwrap();
        ks.expire(b"k", Duration::from_secs(100));

        ks.set(b("k"), b("v"));
        assert_eq!(ks.get(b"k").unwrap(), Some(b("v")));
        assert_eq!(ks.ttl(b"k"), Ttl::Persistent);
    }

    #[test]
    fn test_set_conditions() {
        let ks = Keyspace::new();
        assert!(!ks.set_with(b("k"), b("v"), None, SetCondition::IfExists));
        assert!(ks.set_with(b("k"), b("v"), None, SetCondition::IfMissing));
        assert!(!ks.set_with(b("k"), b("w"), None, SetCondition::IfMissing));
        assert!(ks.set_with(b("k"), b("w"), None, SetCondition::IfExists));
        assert_eq!(ks.get(b"k").unwrap(), Some(b("w")));
    }

    #[test]
    fn test_delete() {
        let ks = Keyspace::new();
        ks.set(b("a"), b("1"));
        ks.set(b("b"), b("2"));
        assert_eq!(ks.delete_many(&[b("a"), b("b"), b("c")]), 2);
        assert!(!ks.delete(b"a"));
        assert!(ks.is_empty());
    }

    #[test]
    fn test_lazy_expiry_purges_on_access() {
        let ks = Keyspace::new();
        ks.set_with(b("k"), b("v"), Some(Duration::from_millis(20)), SetCondition::Always);
        assert!(ks.exists(b"k"));

        std::thread::sleep(Duration::from_millis(40));

        assert!(!ks.exists(b"k"));
        assert_eq!(ks.get(b"k").unwrap(), None);
        assert_eq!(ks.ttl(b"k"), Ttl::Missing);
        assert_eq!(ks.stats().expired, 1);
    }

    #[test]
    fn test_expired_key_is_recreated_fresh_by_writes() {
        let ks = Keyspace::new();
        ks.rpush(b("list"), vec![b("old")]).unwrap();
        ks.expire(b"list", Duration::ZERO);

        // The expired list must not leak into the new value.
        assert_eq!(ks.rpush(b("list"), vec![b("new")]).unwrap(), 1);
        assert_eq!(ks.lrange(b"list", 0, -1).unwrap(), vec![b("new")]);
        assert_eq!(ks.ttl(b"list"), Ttl::Persistent);
    }

    #[test]
    fn test_expire_and_persist() {
        let ks = Keyspace::new();
        assert!(!ks.expire(b"k", Duration::from_secs(10)));

        ks.set(b("k"), b("v"));
        assert!(!ks.persist(b"k"));
        assert!(ks.expire(b"k", Duration::from_secs(10)));
        assert!(matches!(ks.ttl(b"k"), Ttl::Remaining(d) if d <= Duration::from_secs(10)));
        assert!(ks.persist(b"k"));
        assert_eq!(ks.ttl(b"k"), Ttl::Persistent);
    }

    #[test]
    fn test_incr() {
        let ks = Keyspace::new();
        assert_eq!(ks.incr_by(b"counter", 1), Ok(1));
        assert_eq!(ks.incr_by(b"counter", 1), Ok(2));
        assert_eq!(ks.decr_by(b"counter", 5), Ok(-3));

        ks.set(b("num"), b("10"));
        assert_eq!(ks.incr_by(b"num", 1), Ok(11));
        assert_eq!(ks.get(b"num").unwrap(), Some(b("11")));
    }

    #[test]
    fn test_incr_rejects_non_integer_and_keeps_value() {
        let ks = Keyspace::new();
        ks.set(b("text"), b("abc"));
        assert_eq!(ks.incr_by(b"text", 1), Err(StorageError::NotInteger));
        assert_eq!(ks.get(b"text").unwrap(), Some(b("abc")));

        ks.set(b("max"), Bytes::from(i64::MAX.to_string()));
        assert_eq!(ks.incr_by(b"max", 1), Err(StorageError::Overflow));

        ks.sadd(b("set"), vec![b("x")]).unwrap();
        assert_eq!(ks.incr_by(b"set", 1), Err(StorageError::WrongType));
    }

    #[test]
    fn test_incr_keeps_ttl() {
        let ks = Keyspace::new();
        ks.set_with(b("n"), b("1"), Some(Duration::from_secs(100)), SetCondition::Always);
        ks.incr_by(b"n", 1).unwrap();
        assert!(matches!(ks.ttl(b"n"), Ttl::Remaining(_)));
    }

    #[test]
    fn test_append_and_strlen() {
        let ks = Keyspace::new();
        assert_eq!(ks.append(b"k", b"Hello"), Ok(5));
        assert_eq!(ks.append(b"k", b" World"), Ok(11));
        assert_eq!(ks.strlen(b"k"), Ok(11));
        assert_eq!(ks.strlen(b"missing"), Ok(0));
    }

    #[test]
    fn test_push_order() {
        let ks = Keyspace::new();
        ks.lpush(b("l"), vec![b("a"), b("b"), b("c")]).unwrap();
        assert_eq!(ks.lrange(b"l", 0, -1).unwrap(), vec![b("c"), b("b"), b("a")]);

        ks.rpush(b("r"), vec![b("a"), b("b"), b("c")]).unwrap();
        assert_eq!(ks.lrange(b"r", 0, -1).unwrap(), vec![b("a"), b("b"), b("c")]);
    }

    #[test]
    fn test_lrange_bounds() {
        let ks = Keyspace::new();
        ks.rpush(b("l"), vec![b("a"), b("b"), b("c"), b("d")]).unwrap();

        assert_eq!(ks.lrange(b"l", -1, -1).unwrap(), vec![b("d")]);
        assert_eq!(ks.lrange(b"l", 1, 2).unwrap(), vec![b("b"), b("c")]);
        assert_eq!(ks.lrange(b"l", -100, 100).unwrap().len(), 4);
        assert!(ks.lrange(b"l", 3, 1).unwrap().is_empty());
        assert!(ks.lrange(b"l", 10, 20).unwrap().is_empty());
        assert!(ks.lrange(b"l", 0, -10).unwrap().is_empty());
        assert!(ks.lrange(b"missing", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn test_pop_removes_empty_list() {
        let ks = Keyspace::new();
        ks.rpush(b("l"), vec![b("a"), b("b")]).unwrap();
        assert_eq!(ks.lpop(b"l").unwrap(), Some(b("a")));
        assert_eq!(ks.rpop(b"l").unwrap(), Some(b("b")));
        assert_eq!(ks.lpop(b"l").unwrap(), None);
        assert!(!ks.exists(b"l"));
    }

    #[test]
    fn test_lindex() {
        let ks = Keyspace::new();
        ks.rpush(b("l"), vec![b("a"), b("b")]).unwrap();
        assert_eq!(ks.lindex(b"l", 0).unwrap(), Some(b("a")));
        assert_eq!(ks.lindex(b"l", -1).unwrap(), Some(b("b")));
        assert_eq!(ks.lindex(b"l", 2).unwrap(), None);
        assert_eq!(ks.lindex(b"l", -3).unwrap(), None);
    }

    #[test]
    fn test_wrong_type_errors() {
        let ks = Keyspace::new();
        ks.set(b("s"), b("v"));
        assert_eq!(ks.lpush(b("s"), vec![b("x")]), Err(StorageError::WrongType));
        assert_eq!(ks.hset(b("s"), vec![(b("f"), b("v"))]), Err(StorageError::WrongType));
        assert_eq!(ks.sadd(b("s"), vec![b("m")]), Err(StorageError::WrongType));
        assert_eq!(ks.lrange(b"s", 0, -1), Err(StorageError::WrongType));

        ks.rpush(b("l"), vec![b("x")]).unwrap();
        assert_eq!(ks.get(b"l"), Err(StorageError::WrongType));
        assert_eq!(ks.key_type(b"l"), "list");
        assert_eq!(ks.key_type(b"s"), "string");
        assert_eq!(ks.key_type(b"none"), "none");
    }

    #[test]
    fn test_hash_ops() {
        let ks = Keyspace::new();
        assert_eq!(ks.hset(b("h"), vec![(b("f1"), b("v1")), (b("f2"), b("v2"))]), Ok(2));
        assert_eq!(ks.hset(b("h"), vec![(b("f1"), b("v1b"))]), Ok(0));
        assert_eq!(ks.hget(b"h", b"f1").unwrap(), Some(b("v1b")));
        assert_eq!(ks.hget(b"h", b"nope").unwrap(), None);
        assert_eq!(ks.hlen(b"h"), Ok(2));
        assert_eq!(ks.hexists(b"h", b"f2"), Ok(true));
        assert_eq!(
            ks.hgetall(b"h").unwrap(),
            vec![(b("f1"), b("v1b")), (b("f2"), b("v2"))]
        );

        assert_eq!(ks.hdel(b"h", &[b("f1"), b("zzz")]), Ok(1));
        assert_eq!(ks.hdel(b"h", &[b("f2")]), Ok(1));
        assert!(!ks.exists(b"h"));
    }

    #[test]
    fn test_set_ops() {
        let ks = Keyspace::new();
        assert_eq!(ks.sadd(b("s"), vec![b("b"), b("a"), b("a")]), Ok(2));
        assert_eq!(ks.smembers(b"s").unwrap(), vec![b("a"), b("b")]);
        assert_eq!(ks.sismember(b"s", b"a"), Ok(true));
        assert_eq!(ks.scard(b"s"), Ok(2));
        assert_eq!(ks.srem(b"s", &[b("a"), b("c")]), Ok(1));
        assert_eq!(ks.srem(b"s", &[b("b")]), Ok(1));
        assert!(!ks.exists(b"s"));
    }

    #[test]
    fn test_keys_pattern() {
        let ks = Keyspace::new();
        ks.set(b("user:1"), b("a"));
        ks.set(b("user:2"), b("b"));
        ks.set(b("session:1"), b("c"));
        assert_eq!(ks.keys(b"user:*"), vec![b("user:1"), b("user:2")]);
        assert_eq!(ks.keys(b"*").len(), 3);
    }

    #[test]
    fn test_cleanup_expired() {
        let ks = Keyspace::new();
        for i in 0..10 {
            ks.set_with(
                Bytes::from(format!("k{}", i)),
                b("v"),
                Some(Duration::ZERO),
                SetCondition::Always,
            );
        }
        ks.set(b("keep"), b("v"));
        assert_eq!(ks.cleanup_expired(), 10);
        assert_eq!(ks.len(), 1);
    }

    #[test]
    fn test_snapshot_and_restore() {
        let ks = Keyspace::new();
        ks.set(b("s"), b("v"));
        ks.rpush(b("l"), vec![b("a"), b("b")]).unwrap();
        ks.set_with(b("gone"), b("v"), Some(Duration::ZERO), SetCondition::Always);

        let entries = ks.snapshot();
        assert_eq!(entries.len(), 2);

        let copy = Keyspace::new();
        assert_eq!(copy.restore(entries), 2);
        assert_eq!(copy.get(b"s").unwrap(), Some(b("v")));
        assert_eq!(copy.lrange(b"l", 0, -1).unwrap(), vec![b("a"), b("b")]);
    }

    #[test]
    fn test_concurrent_writers_never_tear_values() {
        let ks = Arc::new(Keyspace::new());
        let values: Vec<Bytes> = (0..8)
            .map(|i| Bytes::from(vec![b'a' + i as u8; 1024]))
            .collect();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ks = Arc::clone(&ks);
                let values = values.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        ks.set(b("shared"), values[i].clone());
                        if let Some(v) = ks.get(b"shared").unwrap() {
                            assert!(values.contains(&v));
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
