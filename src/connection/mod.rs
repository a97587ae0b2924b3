//! Connection Handler Module
//!
//! This module manages individual client connections. Each connection is
//! served by its own async task; the only state tasks share is the storage
//! engine behind the `CommandHandler`.
//!
//! ## Example
//!
//! ```ignore
//! use respkv::connection::handle_connection;
//! use respkv::commands::CommandHandler;
//! use respkv::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(StorageEngine::new());
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! let handler = CommandHandler::new(Arc::clone(&storage));
//! tokio::spawn(handle_connection(stream, addr, handler));
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler};
