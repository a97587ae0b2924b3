//! # respkv - A Minimal In-Memory Key-Value Server
//!
//! respkv speaks the Redis Serialization Protocol (RESP), so `redis-cli` and
//! ordinary Redis client libraries can talk to it. It supports a deliberately
//! small command set: `PING`, `ECHO`, `GET` and `SET` (with an optional `PX`
//! expiry).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              respkv                              │
//! │                                                                  │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐           │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │           │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │           │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘           │
//! │                            │                  │                  │
//! │                            ▼                  ▼                  │
//! │                     ┌─────────────┐    ┌──────────────────────┐  │
//! │                     │ RESP Reader │    │    StorageEngine     │  │
//! │                     │  + Parser   │    │  sharded RwLock maps │  │
//! │                     └─────────────┘    └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use respkv::storage::StorageEngine;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let listener = TcpListener::bind("127.0.0.1:6379").await?;
//!     respkv::server::run(listener, storage).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Expiry
//!
//! `SET key value PX ms` stores an absolute deadline with the key. Expiry is
//! lazy: a key past its deadline is dropped the next time it is read, and
//! there is no background sweeper.
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP values, parser and stream reader
//! - [`storage`]: thread-safe storage engine with TTL support
//! - [`commands`]: command resolution and execution
//! - [`connection`]: per-client read-execute-respond loop
//! - [`server`]: TCP accept loop

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::{CommandError, CommandHandler};
pub use connection::{handle_connection, ConnectionError, ConnectionHandler};
pub use protocol::{DecodeError, ParseError, RespParser, RespReader, RespValue};
pub use storage::StorageEngine;

/// The default port respkv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host respkv binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
