//! Counter store backends.
//!
//! The store is the only stateful piece of the rate limiter. The single
//! operation it exposes, increment-with-expiry, must be atomic at the store
//! level: a read-then-write pair would let concurrent requests slip past the
//! limit. [`MemoryStore`] serializes increments per key and is suitable for a
//! single process; [`RedisStore`] shares counters across instances.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::AsyncCommands;

use crate::error::Result;

/// Post-increment state of a windowed counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Count after this increment, including rejected requests
    pub count: u64,
    /// When the current window expires
    pub reset_at: DateTime<Utc>,
}

/// A key-value store supporting atomic increment-with-expiry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter at `key`, creating it with an expiry
    /// of `window` when absent. Returns the post-increment state.
    async fn incr(&self, key: &str, window: Duration) -> Result<WindowCount>;
}

#[derive(Debug)]
struct MemoryCounter {
    count: u64,
    /// Unix seconds, floored to the window boundary
    window_start: i64,
    window_secs: i64,
}

/// In-process counter store.
///
/// Counters live in epoch-floored fixed windows, so every process computes
/// the same window boundaries for a given key. Quota enforcement is
/// per-instance; multi-instance deployments need [`RedisStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: DashMap<String, MemoryCounter>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    /// Drop counters whose window has passed. Returns the number removed.
    ///
    /// Expired counters are inert (the next increment resets them), so the
    /// sweep only reclaims memory. Intended to run from a scheduled job.
    pub fn sweep(&self) -> usize {
        let now = Utc::now().timestamp();
        let before = self.counters.len();
        self.counters
            .retain(|_, counter| now < counter.window_start + counter.window_secs);
        before - self.counters.len()
    }

    /// Number of tracked counters, including expired ones.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether the store tracks no counters.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn incr(&self, key: &str, window: Duration) -> Result<WindowCount> {
        let window_secs = window.as_secs().max(1) as i64;
        let now = Utc::now().timestamp();
        let window_start = (now / window_secs) * window_secs;

        // The entry guard holds the shard lock, making reset-and-increment
        // atomic with respect to other callers of the same key.
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert(MemoryCounter {
                count: 0,
                window_start,
                window_secs,
            });
        if entry.window_start != window_start {
            entry.count = 0;
            entry.window_start = window_start;
            entry.window_secs = window_secs;
        }
        entry.count += 1;
        let count = entry.count;
        drop(entry);

        let reset_at = DateTime::<Utc>::from_timestamp(window_start + window_secs, 0)
            .unwrap_or_else(Utc::now);
        Ok(WindowCount { count, reset_at })
    }
}

/// Redis-backed counter store for multi-instance deployments.
///
/// Uses `INCR` as the atomic primitive and sets the key TTL when the counter
/// is created, so windows expire server-side without a sweeper.
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    /// Connect to the Redis instance at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn incr(&self, key: &str, window: Duration) -> Result<WindowCount> {
        let mut conn = self.conn.clone();
        let window_secs = window.as_secs().max(1) as i64;

        let (count, ttl): (u64, i64) = redis::pipe()
            .atomic()
            .incr(key, 1u64)
            .ttl(key)
            .query_async(&mut conn)
            .await?;

        // First increment creates the key without an expiry; attach the
        // window TTL. A negative TTL on an existing key means the expiry was
        // lost, so reattach it rather than leak the counter.
        let ttl = if count == 1 || ttl < 0 {
            let _: i64 = conn.expire(key, window_secs).await?;
            window_secs
        } else {
            ttl
        };

        let reset_at = Utc::now() + chrono::Duration::seconds(ttl);
        Ok(WindowCount { count, reset_at })
    }
}
