//! Connection Handler Module
//!
//! Each client gets its own handler task that runs in a loop, reading
//! requests and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects, ConnectionHandler spawned
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  Parse every complete        │
//!    │  request in the buffer,      │
//!    │  execute, queue the reply    │
//!    │              │               │
//!    │              ▼               │
//!    │  Flush queued replies        │
//!    │              │               │
//!    │              ▼               │
//!    │  Read more bytes, or stop    │
//!    │  on the shutdown signal      │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 3. EOF / QUIT / protocol error / shutdown: handler task ends
//! ```
//!
//! ## Buffer Management
//!
//! A BytesMut buffer accumulates incoming data. TCP is a stream protocol, so
//! one read may hold half a request or several pipelined ones. Replies are
//! written in request order and flushed once per batch.

use crate::commands::CommandHandler;
use crate::protocol::{ParseError, RespParser, RespValue};
use crate::shutdown::wait_for_shutdown;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Maximum bytes buffered for a single connection (64 MB)
pub const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed RESP from the client
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial request)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Why the main loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Quit,
    Shutdown,
}

/// Handles a single client connection.
///
/// Generic over the stream so tests can drive it with an in-memory mock.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Largest number of unparsed bytes held before the client is dropped
    buffer_limit: usize,

    command_handler: CommandHandler,

    parser: RespParser,

    stats: Arc<ConnectionStats>,

    shutdown: watch::Receiver<bool>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            buffer_limit: MAX_BUFFER_SIZE,
            command_handler,
            parser: RespParser::new(),
            stats,
            shutdown,
        }
    }

    /// Overrides [`MAX_BUFFER_SIZE`] for this connection.
    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = limit;
        self
    }

    /// Runs the connection until the client leaves, sends QUIT, sends
    /// malformed data, or the server shuts down.
    pub async fn run(mut self) -> Result<CloseReason, ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(reason) => info!(client = %self.addr, reason = ?reason, "Connection closed"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<CloseReason, ConnectionError> {
        loop {
            let mut pending = false;
            while let Some(request) = self.next_request().await? {
                let quit = is_quit(&request);
                let response = self.command_handler.execute(request);
                self.stats.command_processed();
                self.write_response(&response).await?;
                pending = true;

                if quit && !response.is_error() {
                    self.stream.flush().await?;
                    return Ok(CloseReason::Quit);
                }
            }

            if pending {
                self.stream.flush().await?;
            }

            if *self.shutdown.borrow() {
                return Ok(CloseReason::Shutdown);
            }

            if self.buffer.len() >= self.buffer_limit {
                error!(
                    client = %self.addr,
                    size = self.buffer.len(),
                    "Buffer size limit exceeded"
                );
                let reply = RespValue::error(format!(
                    "ERR Protocol error: request exceeds the {} byte buffer limit",
                    self.buffer_limit
                ));
                if self.write_response(&reply).await.is_ok() {
                    let _ = self.stream.flush().await;
                }
                return Err(ConnectionError::BufferFull);
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(4096);
            }

            tokio::select! {
                read = self.stream.get_mut().read_buf(&mut self.buffer) => {
                    let n = read?;
                    if n == 0 {
                        return Err(if self.buffer.is_empty() {
                            ConnectionError::ClientDisconnected
                        } else {
                            ConnectionError::UnexpectedEof
                        });
                    }
                    self.stats.bytes_read(n);
                    trace!(client = %self.addr, bytes = n, "Read data");
                }
                _ = wait_for_shutdown(&mut self.shutdown) => {
                    debug!(client = %self.addr, "Closing connection for shutdown");
                    return Ok(CloseReason::Shutdown);
                }
            }
        }
    }

    /// Takes the next complete request off the buffer.
    ///
    /// On malformed input, replies with a protocol error before failing so
    /// the client learns why the connection is closing.
    async fn next_request(&mut self) -> Result<Option<RespValue>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((value, consumed))) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed request"
                );
                Ok(Some(value))
            }
            Ok(None) => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete request, need more data"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Parse error");
                let reply = RespValue::error(format!("ERR Protocol error: {}", e));
                if self.write_response(&reply).await.is_ok() {
                    let _ = self.stream.flush().await;
                }
                Err(ConnectionError::ParseError(e))
            }
        }
    }

    /// Queues a reply in the write buffer.
    async fn write_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stats.bytes_written(bytes.len());
        trace!(client = %self.addr, bytes = bytes.len(), "Queued response");
        Ok(())
    }
}

// Runs on every exit path, including an aborted task.
impl<S> Drop for ConnectionHandler<S> {
    fn drop(&mut self) {
        self.stats.connection_closed();
    }
}

fn is_quit(request: &RespValue) -> bool {
    match request {
        RespValue::Array(items) => match items.first() {
            Some(RespValue::BulkString(name)) => name.eq_ignore_ascii_case(b"QUIT"),
            Some(RespValue::SimpleString(name)) => name.eq_ignore_ascii_case("QUIT"),
            _ => false,
        },
        _ => false,
    }
}

/// Handles a client connection to completion.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
    }

    let handler = ConnectionHandler::new(stream, addr, command_handler, stats, shutdown);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}
