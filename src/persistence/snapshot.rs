//! Snapshot file format.
//!
//! ```text
//! +------------------+
//! | Magic (6B)       |  "SNAPKV"
//! +------------------+
//! | Version (2B)     |  u16 little-endian
//! +------------------+
//! | Records...       |  0xFE, then one record per key
//! +------------------+
//! | EOF marker       |  0xFF
//! +------------------+
//! | Record count     |  u64
//! +------------------+
//! ```
//!
//! A record is:
//!
//! ```text
//! type_tag u8 | expiry_flag u8 | [expires_at u64 unix millis] | key blob | payload
//! ```
//!
//! Blobs are a `u32` length followed by the bytes. A string payload is one
//! blob; lists and sets are a `u32` count followed by blobs; hashes are a
//! `u32` count followed by field/value blob pairs. All integers are
//! little-endian.

use crate::storage::{Entry, Value};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const MAGIC: &[u8; 6] = b"SNAPKV";
pub const VERSION: u16 = 1;

mod opcode {
    pub const ENTRY: u8 = 0xFE;
    pub const EOF: u8 = 0xFF;
}

/// Errors raised while writing or reading snapshots.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no snapshot at {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a snapshot file (bad magic)")]
    BadMagic,

    #[error("unsupported snapshot version {found} (expected {VERSION})")]
    UnsupportedVersion { found: u16 },

    #[error("snapshot is truncated")]
    Truncated,

    #[error("unknown value type tag {0}")]
    UnknownTypeTag(u8),

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    #[error("value of {0} bytes or elements is too large for a snapshot")]
    TooLarge(usize),
}

/// Value type tags
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeTag {
    String = 0,
    List = 1,
    Hash = 2,
    Set = 3,
}

impl TypeTag {
    fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => TypeTag::String,
            Value::List(_) => TypeTag::List,
            Value::Hash(_) => TypeTag::Hash,
            Value::Set(_) => TypeTag::Set,
        }
    }
}

impl TryFrom<u8> for TypeTag {
    type Error = PersistenceError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TypeTag::String),
            1 => Ok(TypeTag::List),
            2 => Ok(TypeTag::Hash),
            3 => Ok(TypeTag::Set),
            other => Err(PersistenceError::UnknownTypeTag(other)),
        }
    }
}

/// Maps monotonic deadlines to wall-clock milliseconds and back.
///
/// Both clocks are sampled once so every record in a file uses the same origin.
#[derive(Debug, Clone, Copy)]
struct WallClock {
    instant: Instant,
    unix_ms: u64,
}

impl WallClock {
    fn now() -> Self {
        Self {
            instant: Instant::now(),
            unix_ms: unix_millis(),
        }
    }

    fn to_unix_ms(self, deadline: Instant) -> u64 {
        let ahead = deadline.saturating_duration_since(self.instant).as_millis() as u64;
        self.unix_ms.saturating_add(ahead)
    }

    /// Returns None when the deadline has already passed.
    fn to_instant(self, unix_ms: u64) -> Result<Option<Instant>, PersistenceError> {
        match unix_ms.checked_sub(self.unix_ms) {
            Some(ahead) if ahead > 0 => self
                .instant
                .checked_add(Duration::from_millis(ahead))
                .map(Some)
                .ok_or_else(|| PersistenceError::Corrupt(format!("expiry out of range: {}", unix_ms))),
            _ => Ok(None),
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Encodes keyspace entries into a snapshot image.
pub fn encode(entries: &[(Bytes, Entry)]) -> Result<Bytes, PersistenceError> {
    let clock = WallClock::now();
    let mut buf = BytesMut::with_capacity(64 + entries.len() * 32);

    buf.put_slice(MAGIC);
    buf.put_u16_le(VERSION);

    for (key, entry) in entries {
        buf.put_u8(opcode::ENTRY);
        buf.put_u8(TypeTag::of(&entry.value) as u8);
        match entry.expires_at {
            Some(deadline) => {
                buf.put_u8(1);
                buf.put_u64_le(clock.to_unix_ms(deadline));
            }
            None => buf.put_u8(0),
        }
        put_blob(&mut buf, key)?;

        match &entry.value {
            Value::String(data) => put_blob(&mut buf, data)?,
            Value::List(items) => {
                put_count(&mut buf, items.len())?;
                for item in items {
                    put_blob(&mut buf, item)?;
                }
            }
            Value::Hash(fields) => {
                put_count(&mut buf, fields.len())?;
                for (field, value) in fields {
                    put_blob(&mut buf, field)?;
                    put_blob(&mut buf, value)?;
                }
            }
            Value::Set(members) => {
                put_count(&mut buf, members.len())?;
                for member in members {
                    put_blob(&mut buf, member)?;
                }
            }
        }
    }

    buf.put_u8(opcode::EOF);
    buf.put_u64_le(entries.len() as u64);
    Ok(buf.freeze())
}

/// Lengths and counts are stored as `u32`; anything larger cannot be encoded.
fn len_u32(len: usize) -> Result<u32, PersistenceError> {
    u32::try_from(len).map_err(|_| PersistenceError::TooLarge(len))
}

fn put_count(buf: &mut BytesMut, count: usize) -> Result<(), PersistenceError> {
    buf.put_u32_le(len_u32(count)?);
    Ok(())
}

fn put_blob(buf: &mut BytesMut, data: &[u8]) -> Result<(), PersistenceError> {
    buf.put_u32_le(len_u32(data.len())?);
    buf.put_slice(data);
    Ok(())
}

/// Decodes a snapshot image.
///
/// The whole image is validated before anything is returned. Records whose
/// expiry has already passed are dropped.
pub fn decode(data: &[u8]) -> Result<Vec<(Bytes, Entry)>, PersistenceError> {
    let clock = WallClock::now();
    let mut reader = Reader { buf: data };

    if reader.buf.remaining() < MAGIC.len() || &reader.buf[..MAGIC.len()] != MAGIC {
        return Err(PersistenceError::BadMagic);
    }
    reader.buf.advance(MAGIC.len());

    let version = reader.u16()?;
    if version != VERSION {
        return Err(PersistenceError::UnsupportedVersion { found: version });
    }

    let mut entries = Vec::new();
    let mut records = 0u64;
    loop {
        match reader.u8()? {
            opcode::ENTRY => {
                records += 1;
                let (key, value, expires_at) = reader.record()?;
                let expires_at = match expires_at {
                    Some(unix_ms) => match clock.to_instant(unix_ms)? {
                        Some(deadline) => Some(deadline),
                        None => continue,
                    },
                    None => None,
                };
                entries.push((key, Entry { value, expires_at }));
            }
            opcode::EOF => {
                let declared = reader.u64()?;
                if declared != records {
                    return Err(PersistenceError::Corrupt(format!(
                        "record count mismatch: header says {}, found {}",
                        declared, records
                    )));
                }
                if reader.buf.has_remaining() {
                    return Err(PersistenceError::Corrupt(format!(
                        "{} trailing bytes after EOF marker",
                        reader.buf.remaining()
                    )));
                }
                return Ok(entries);
            }
            other => {
                return Err(PersistenceError::Corrupt(format!(
                    "unknown opcode {:#04x}",
                    other
                )))
            }
        }
    }
}

/// Bounds-checked reads over the snapshot image.
struct Reader<'a> {
    buf: &'a [u8],
}

impl Reader<'_> {
    fn need(&self, n: usize) -> Result<(), PersistenceError> {
        if self.buf.remaining() < n {
            return Err(PersistenceError::Truncated);
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, PersistenceError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16, PersistenceError> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    fn u32(&mut self) -> Result<u32, PersistenceError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn u64(&mut self) -> Result<u64, PersistenceError> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    fn blob(&mut self) -> Result<Bytes, PersistenceError> {
        let len = self.u32()? as usize;
        self.need(len)?;
        Ok(self.buf.copy_to_bytes(len))
    }

    /// Reads a collection count, bounded by what the remaining bytes could hold.
    fn count(&mut self) -> Result<usize, PersistenceError> {
        let count = self.u32()? as usize;
        // every element takes at least a 4 byte length prefix
        if count > self.buf.remaining() / 4 {
            return Err(PersistenceError::Truncated);
        }
        Ok(count)
    }

    fn record(&mut self) -> Result<(Bytes, Value, Option<u64>), PersistenceError> {
        let tag = TypeTag::try_from(self.u8()?)?;
        let expires_at = match self.u8()? {
            0 => None,
            1 => Some(self.u64()?),
            flag => {
                return Err(PersistenceError::Corrupt(format!(
                    "invalid expiry flag {}",
                    flag
                )))
            }
        };
        let key = self.blob()?;

        let value = match tag {
            TypeTag::String => Value::String(self.blob()?),
            TypeTag::List => {
                let count = self.count()?;
                let mut items = VecDeque::with_capacity(count);
                for _ in 0..count {
                    items.push_back(self.blob()?);
                }
                Value::List(items)
            }
            TypeTag::Hash => {
                let count = self.count()?;
                let mut fields = HashMap::with_capacity(count);
                for _ in 0..count {
                    let field = self.blob()?;
                    fields.insert(field, self.blob()?);
                }
                Value::Hash(fields)
            }
            TypeTag::Set => {
                let count = self.count()?;
                let mut members = HashSet::with_capacity(count);
                for _ in 0..count {
                    members.insert(self.blob()?);
                }
                Value::Set(members)
            }
        };

        Ok((key, value, expires_at))
    }
}
