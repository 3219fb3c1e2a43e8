//! Connection Handler Module
//!
//! This module manages individual client connections. Each client
//! connection is handled by its own async task, so one slow client never
//! stalls another.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ Parse RESP  │───>│ Execute cmd │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │         ▲                                     │             │
//! │         │                                     ▼             │
//! │   shutdown signal                     ┌─────────────┐        │
//! │                                       │ Send resp   │        │
//! │                                       └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Pipelining**: several requests in one read are answered in order
//!   with a single flush
//! - **Graceful shutdown**: a connection finishes the requests it already
//!   has, then closes when the server's shutdown signal fires
//! - **Statistics**: connection and command counters shared with `INFO`

pub mod handler;

pub use handler::{
    handle_connection, CloseReason, ConnectionError, ConnectionHandler, ConnectionStats,
};
