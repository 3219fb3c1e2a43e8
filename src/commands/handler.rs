//! Command Handler Module
//!
//! Turns a parsed RESP request into a call against the keyspace and builds
//! the reply. The request must be an array whose first element names the
//! command (case-insensitive); the remaining elements are its arguments.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ request_args│───>│  dispatch() │───>│  cmd_xxx()  │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                           Keyspace          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every `cmd_xxx` validates its arity first, so a malformed request never
//! touches the keyspace. Failures travel as [`CommandError`] and become a
//! single RESP error reply in [`CommandHandler::execute`].

use crate::connection::ConnectionStats;
use crate::persistence::PersistenceManager;
use crate::protocol::RespValue;
use crate::storage::{Keyspace, StorageError};
use bytes::Bytes;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Upper bound on any TTL accepted from a client (about 100 years).
pub(super) const MAX_TTL_MS: i64 = 100 * 365 * 24 * 60 * 60 * 1000;

/// Every command name this server understands.
const COMMANDS: &[&str] = &[
    // server
    "PING", "ECHO", "QUIT", "DBSIZE", "FLUSHDB", "FLUSHALL", "INFO", "TIME", "COMMAND", "BGSAVE",
    "LASTSAVE",
    // keys
    "DEL", "EXISTS", "EXPIRE", "PEXPIRE", "TTL", "PTTL", "PERSIST", "TYPE", "KEYS",
    // strings
    "SET", "GET", "INCR", "DECR", "INCRBY", "DECRBY", "APPEND", "STRLEN", "MGET", "MSET",
    // lists
    "LPUSH", "RPUSH", "LPOP", "RPOP", "LLEN", "LINDEX", "LRANGE",
    // hashes
    "HSET", "HGET", "HDEL", "HGETALL", "HEXISTS", "HLEN",
    // sets
    "SADD", "SREM", "SMEMBERS", "SISMEMBER", "SCARD",
];

/// Errors a command can fail with. The `Display` form is the RESP error text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpireTime(String),

    #[error("ERR {0}")]
    InvalidRequest(&'static str),

    #[error("ERR {0}")]
    Persistence(&'static str),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type CommandResult = Result<RespValue, CommandError>;

/// How many arguments (excluding the command name) a command accepts.
#[derive(Debug, Clone, Copy)]
pub(super) enum Arity {
    Exact(usize),
    AtLeast(usize),
    Range(usize, usize),
}

/// Fails with `WrongArity` unless `args` matches `arity`.
pub(super) fn check_arity(name: &str, args: &[Bytes], arity: Arity) -> Result<(), CommandError> {
    let n = args.len();
    let ok = match arity {
        Arity::Exact(want) => n == want,
        Arity::AtLeast(min) => n >= min,
        Arity::Range(min, max) => (min..=max).contains(&n),
    };
    if ok {
        Ok(())
    } else {
        Err(CommandError::WrongArity(name.to_string()))
    }
}

/// Parses a base-10 signed integer argument.
pub(super) fn parse_int(arg: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotInteger)
}

/// Parses a TTL argument in `unit`s. `Ok(None)` means the TTL is not positive.
pub(super) fn parse_ttl(name: &str, arg: &[u8], unit_ms: i64) -> Result<Option<Duration>, CommandError> {
    let amount = parse_int(arg)?;
    if amount <= 0 {
        return Ok(None);
    }
    match amount.checked_mul(unit_ms) {
        Some(ms) if ms <= MAX_TTL_MS => Ok(Some(Duration::from_millis(ms as u64))),
        _ => Err(CommandError::InvalidExpireTime(name.to_string())),
    }
}

pub(super) fn bulk_or_null(value: Option<Bytes>) -> RespValue {
    match value {
        Some(v) => RespValue::bulk_string(v),
        None => RespValue::null(),
    }
}

pub(super) fn bulk_array(values: impl IntoIterator<Item = Bytes>) -> RespValue {
    RespValue::array(values.into_iter().map(RespValue::bulk_string).collect())
}

/// Flattens a request array into raw argument bytes.
fn request_args(request: RespValue) -> Result<Vec<Bytes>, CommandError> {
    let items = match request {
        RespValue::Array(items) => items,
        _ => return Err(CommandError::InvalidRequest("invalid command format")),
    };

    items
        .into_iter()
        .map(|item| match item {
            RespValue::BulkString(b) => Ok(b),
            RespValue::SimpleString(s) => Ok(Bytes::from(s)),
            RespValue::Integer(n) => Ok(Bytes::from(n.to_string())),
            _ => Err(CommandError::InvalidRequest("invalid command format")),
        })
        .collect()
}

/// Executes commands against a shared keyspace.
///
/// Cheap to clone: one instance is created by the server and cloned into
/// every connection task.
#[derive(Clone)]
pub struct CommandHandler {
    pub(super) keyspace: Arc<Keyspace>,
    persistence: Option<Arc<PersistenceManager>>,
    stats: Option<Arc<ConnectionStats>>,
    start_time: Instant,
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("persistence", &self.persistence.is_some())
            .finish()
    }
}

impl CommandHandler {
    pub fn new(keyspace: Arc<Keyspace>) -> Self {
        Self {
            keyspace,
            persistence: None,
            stats: None,
            start_time: Instant::now(),
        }
    }

    /// Enables `BGSAVE` and `LASTSAVE`.
    pub fn with_persistence(mut self, persistence: Arc<PersistenceManager>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Reports connection counters in `INFO`.
    pub fn with_stats(mut self, stats: Arc<ConnectionStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn keyspace(&self) -> &Arc<Keyspace> {
        &self.keyspace
    }

    /// Executes a request and returns the reply. Never fails: errors become
    /// RESP error replies.
    pub fn execute(&self, request: RespValue) -> RespValue {
        self.try_execute(request)
            .unwrap_or_else(|e| RespValue::error(e.to_string()))
    }

    /// Like [`execute`](Self::execute) but keeps the error typed.
    pub fn try_execute(&self, request: RespValue) -> CommandResult {
        let args = request_args(request)?;
        let (name, args) = args
            .split_first()
            .ok_or(CommandError::InvalidRequest("empty command"))?;
        self.call(name, args)
    }

    /// Runs the command `name` with `args` (excluding the name itself).
    pub fn call(&self, name: &[u8], args: &[Bytes]) -> CommandResult {
        let name = String::from_utf8_lossy(name);
        let upper = name.to_ascii_uppercase();
        self.dispatch(&upper, args)
            .map_err(|e| match e {
                CommandError::UnknownCommand(_) => CommandError::UnknownCommand(name.to_string()),
                other => other,
            })
    }

    fn dispatch(&self, cmd: &str, args: &[Bytes]) -> CommandResult {
        match cmd {
            // Server commands
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "QUIT" => self.cmd_quit(args),
            "DBSIZE" => self.cmd_dbsize(args),
            "FLUSHDB" | "FLUSHALL" => self.cmd_flushdb(cmd, args),
            "INFO" => self.cmd_info(args),
            "TIME" => self.cmd_time(args),
            "COMMAND" => self.cmd_command(args),
            "BGSAVE" => self.cmd_bgsave(args),
            "LASTSAVE" => self.cmd_lastsave(args),

            // Key commands
            "DEL" => self.cmd_del(args),
            "EXISTS" => self.cmd_exists(args),
            "EXPIRE" => self.cmd_expire("expire", args, 1000),
            "PEXPIRE" => self.cmd_expire("pexpire", args, 1),
            "TTL" => self.cmd_ttl(args),
            "PTTL" => self.cmd_pttl(args),
            "PERSIST" => self.cmd_persist(args),
            "TYPE" => self.cmd_type(args),
            "KEYS" => self.cmd_keys(args),

            // String commands
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "INCR" => self.cmd_incr(args),
            "DECR" => self.cmd_decr(args),
            "INCRBY" => self.cmd_incrby(args),
            "DECRBY" => self.cmd_decrby(args),
            "APPEND" => self.cmd_append(args),
            "STRLEN" => self.cmd_strlen(args),
            "MGET" => self.cmd_mget(args),
            "MSET" => self.cmd_mset(args),

            // List commands
            "LPUSH" => self.cmd_lpush(args),
            "RPUSH" => self.cmd_rpush(args),
            "LPOP" => self.cmd_lpop(args),
            "RPOP" => self.cmd_rpop(args),
            "LLEN" => self.cmd_llen(args),
            "LINDEX" => self.cmd_lindex(args),
            "LRANGE" => self.cmd_lrange(args),

            // Hash commands
            "HSET" => self.cmd_hset(args),
            "HGET" => self.cmd_hget(args),
            "HDEL" => self.cmd_hdel(args),
            "HGETALL" => self.cmd_hgetall(args),
            "HEXISTS" => self.cmd_hexists(args),
            "HLEN" => self.cmd_hlen(args),

            // Set commands
            "SADD" => self.cmd_sadd(args),
            "SREM" => self.cmd_srem(args),
            "SMEMBERS" => self.cmd_smembers(args),
            "SISMEMBER" => self.cmd_sismember(args),
            "SCARD" => self.cmd_scard(args),

            _ => Err(CommandError::UnknownCommand(cmd.to_string())),
        }
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> CommandResult {
        check_arity("ping", args, Arity::Range(0, 1))?;
        Ok(match args.first() {
            Some(message) => RespValue::bulk_string(message.clone()),
            None => RespValue::pong(),
        })
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> CommandResult {
        check_arity("echo", args, Arity::Exact(1))?;
        Ok(RespValue::bulk_string(args[0].clone()))
    }

    /// QUIT: the connection closes after this reply is written.
    fn cmd_quit(&self, args: &[Bytes]) -> CommandResult {
        check_arity("quit", args, Arity::Exact(0))?;
        Ok(RespValue::ok())
    }

    /// DBSIZE
    fn cmd_dbsize(&self, args: &[Bytes]) -> CommandResult {
        check_arity("dbsize", args, Arity::Exact(0))?;
        Ok(RespValue::integer(self.keyspace.len() as i64))
    }

    /// FLUSHDB / FLUSHALL [ASYNC|SYNC]
    fn cmd_flushdb(&self, cmd: &str, args: &[Bytes]) -> CommandResult {
        check_arity(&cmd.to_ascii_lowercase(), args, Arity::Range(0, 1))?;
        if let Some(mode) = args.first() {
            if !mode.eq_ignore_ascii_case(b"ASYNC") && !mode.eq_ignore_ascii_case(b"SYNC") {
                return Err(CommandError::Syntax);
            }
        }
        self.keyspace.flush();
        Ok(RespValue::ok())
    }

    /// INFO [section]
    fn cmd_info(&self, args: &[Bytes]) -> CommandResult {
        check_arity("info", args, Arity::Range(0, 1))?;
        let keyspace = self.keyspace.stats();

        let mut info = format!(
            "# Server\r\n\
             snapkv_version:{}\r\n\
             os:{}\r\n\
             uptime_in_seconds:{}\r\n\
             \r\n",
            crate::VERSION,
            std::env::consts::OS,
            self.start_time.elapsed().as_secs(),
        );

        if let Some(stats) = &self.stats {
            info.push_str(&format!(
                "# Stats\r\n\
                 total_connections_received:{}\r\n\
                 connected_clients:{}\r\n\
                 total_commands_processed:{}\r\n\
                 total_net_input_bytes:{}\r\n\
                 total_net_output_bytes:{}\r\n\
                 expired_keys:{}\r\n\
                 \r\n",
                stats.connections_accepted.load(Ordering::Relaxed),
                stats.active_connections.load(Ordering::Relaxed),
                stats.commands_processed.load(Ordering::Relaxed),
                stats.bytes_read.load(Ordering::Relaxed),
                stats.bytes_written.load(Ordering::Relaxed),
                keyspace.expired,
            ));
        }

        if let Some(persistence) = &self.persistence {
            info.push_str(&format!(
                "# Persistence\r\n\
                 snapshot_path:{}\r\n\
                 snapshot_in_progress:{}\r\n\
                 last_save_time:{}\r\n\
                 \r\n",
                persistence.path().display(),
                u8::from(persistence.is_dumping()),
                persistence.last_save(),
            ));
        }

        info.push_str(&format!(
            "# Keyspace\r\n\
             db0:keys={},expires={}\r\n",
            keyspace.keys, keyspace.keys_with_expiry,
        ));

        Ok(RespValue::bulk_string(Bytes::from(info)))
    }

    /// TIME
    fn cmd_time(&self, args: &[Bytes]) -> CommandResult {
        check_arity("time", args, Arity::Exact(0))?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Ok(bulk_array([
            Bytes::from(now.as_secs().to_string()),
            Bytes::from(now.subsec_micros().to_string()),
        ]))
    }

    /// COMMAND
    fn cmd_command(&self, _args: &[Bytes]) -> CommandResult {
        Ok(bulk_array(COMMANDS.iter().copied().map(|c| Bytes::from_static(c.as_bytes()))))
    }

    /// BGSAVE
    fn cmd_bgsave(&self, args: &[Bytes]) -> CommandResult {
        check_arity("bgsave", args, Arity::Range(0, 1))?;
        let persistence = self
            .persistence
            .as_ref()
            .ok_or(CommandError::Persistence("snapshots are disabled"))?;
        if persistence.is_dumping() {
            return Err(CommandError::Persistence("Background save already in progress"));
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(CommandError::Persistence("no runtime available for background save"));
        }

        persistence.spawn_dump();
        Ok(RespValue::simple_string("Background saving started"))
    }

    /// LASTSAVE
    fn cmd_lastsave(&self, args: &[Bytes]) -> CommandResult {
        check_arity("lastsave", args, Arity::Exact(0))?;
        let last = self.persistence.as_ref().map_or(0, |p| p.last_save());
        Ok(RespValue::integer(last as i64))
    }

    // ========================================================================
    // Key Commands
    // ========================================================================

    /// DEL key [key ...]
    fn cmd_del(&self, args: &[Bytes]) -> CommandResult {
        check_arity("del", args, Arity::AtLeast(1))?;
        Ok(RespValue::integer(self.keyspace.delete_many(args) as i64))
    }

    /// EXISTS key [key ...]
    fn cmd_exists(&self, args: &[Bytes]) -> CommandResult {
        check_arity("exists", args, Arity::AtLeast(1))?;
        Ok(RespValue::integer(self.keyspace.exists_many(args) as i64))
    }

    /// EXPIRE key seconds / PEXPIRE key milliseconds
    ///
    /// A non-positive timeout deletes the key.
    fn cmd_expire(&self, name: &str, args: &[Bytes], unit_ms: i64) -> CommandResult {
        check_arity(name, args, Arity::Exact(2))?;
        let applied = match parse_ttl(name, &args[1], unit_ms)? {
            Some(ttl) => self.keyspace.expire(&args[0], ttl),
            None => self.keyspace.delete(&args[0]),
        };
        Ok(RespValue::integer(i64::from(applied)))
    }

    /// TTL key
    fn cmd_ttl(&self, args: &[Bytes]) -> CommandResult {
        check_arity("ttl", args, Arity::Exact(1))?;
        Ok(RespValue::integer(self.keyspace.ttl(&args[0]).as_secs_reply()))
    }

    /// PTTL key
    fn cmd_pttl(&self, args: &[Bytes]) -> CommandResult {
        check_arity("pttl", args, Arity::Exact(1))?;
        Ok(RespValue::integer(self.keyspace.ttl(&args[0]).as_millis_reply()))
    }

    /// PERSIST key
    fn cmd_persist(&self, args: &[Bytes]) -> CommandResult {
        check_arity("persist", args, Arity::Exact(1))?;
        Ok(RespValue::integer(i64::from(self.keyspace.persist(&args[0]))))
    }

    /// TYPE key
    fn cmd_type(&self, args: &[Bytes]) -> CommandResult {
        check_arity("type", args, Arity::Exact(1))?;
        Ok(RespValue::simple_string(self.keyspace.key_type(&args[0])))
    }

    /// KEYS pattern
    fn cmd_keys(&self, args: &[Bytes]) -> CommandResult {
        check_arity("keys", args, Arity::Exact(1))?;
        Ok(bulk_array(self.keyspace.keys(&args[0])))
    }
}
