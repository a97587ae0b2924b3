//! Thread-Safe Storage Engine with Lazy Expiry
//!
//! This module implements the key-value store shared by every client
//! connection.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: The keyspace is split over several shards, each behind its own lock.
//! 2. **Lazy Expiry**: Expiry is checked only when a key is read. There is no background
//!    sweeper, so an expired key that is never read again stays in memory.
//! 3. **RwLock**: Multiple concurrent readers, exclusive writers.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A key always hashes to the same shard, and an entry's value and expiry
//! are written together under that shard's write lock.

use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::trace;

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// A stored value with its optional absolute expiry.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates an entry expiring `ttl` after `now`.
    ///
    /// A deadline too far out to be represented never expires.
    pub fn with_ttl(value: Bytes, ttl: Duration, now: Instant) -> Self {
        Self {
            value,
            expires_at: now.checked_add(ttl),
        }
    }

    /// Checks whether this entry has expired as of `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

type ShardMap = HashMap<Bytes, Entry>;

/// A single shard containing a portion of the key-value pairs.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<ShardMap>,
}

impl Shard {
    // A panic while holding the lock cannot leave an entry half-written
    // (insert and remove are single calls), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, ShardMap> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ShardMap> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The key-value store.
///
/// Wrap it in an `Arc` and hand a clone to every connection. All methods
/// take `&self` and are safe to call from any number of threads or tasks.
///
/// # Example
///
/// ```
/// use respkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("foo"), Bytes::from("bar"));
/// assert_eq!(engine.get(b"foo"), Some(Bytes::from("bar")));
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::ZERO);
/// assert_eq!(engine.get(b"session"), None);
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("entries", &self.len())
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::default()).collect();
        Self { shards }
    }

    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Sets a key-value pair without expiry.
    ///
    /// Overwrites any existing entry for `key`, including its expiry.
    pub fn set(&self, key: Bytes, value: Bytes) {
        self.get_shard(&key).write().insert(key, Entry::new(value));
    }

    /// Sets a key-value pair that expires `ttl` from now.
    ///
    /// A zero `ttl` is accepted; the key reads as absent from then on.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) {
        self.set_with_ttl_at(key, value, ttl, Instant::now());
    }

    fn set_with_ttl_at(&self, key: Bytes, value: Bytes, ttl: Duration, now: Instant) {
        self.get_shard(&key)
            .write()
            .insert(key, Entry::with_ttl(value, ttl, now));
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// entry is removed here; this is the only place expiry is enforced.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &[u8], now: Instant) -> Option<Bytes> {
        let shard = self.get_shard(key);

        // Fast path: read lock for present, live keys.
        {
            let data = shard.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut data = shard.write();
        match data.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                data.remove(key);
                trace!(key = ?String::from_utf8_lossy(key), "Removed expired key");
                None
            }
            // Another writer replaced the entry between the two locks.
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Number of entries physically held, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
