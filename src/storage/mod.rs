//! Storage Engine Module
//!
//! A thread-safe, sharded key-value store with per-key expiry.
//!
//! ## Features
//!
//! - **Sharded Storage**: independent shards reduce lock contention
//! - **RwLock**: multiple concurrent readers, exclusive writers
//! - **Lazy Expiry**: expired keys are detected and dropped when read
//!
//! ## Example
//!
//! ```
//! use respkv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! engine.set(Bytes::from("name"), Bytes::from("bar"));
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("bar")));
//!
//! engine.set_with_ttl(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Duration::from_secs(3600),
//! );
//! ```

pub mod engine;

pub use engine::{Entry, StorageEngine};
