//! Optional-accelerator cache layer.
//!
//! Every operation is a "try": failures degrade to a miss (get) or a no-op
//! (set/del) with a warning, never an error. Correctness must never depend on
//! a cache round-trip succeeding.
//!
//! Key layout:
//! - `feed:{user_id}:{page}:{limit}` → serialized FeedPage
//! - `feat:user:{user_id}` → epoch-stamped user feature vector
//! - `feat:post:{post_id}` → epoch-stamped post feature vector
//! - `vocab:current` → serialized VocabularySet

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};

pub fn feed_key(user_id: Uuid, page: u32, limit: u32) -> String {
    format!("feed:{user_id}:{page}:{limit}")
}

pub fn user_vector_key(user_id: Uuid) -> String {
    format!("feat:user:{user_id}")
}

pub fn post_vector_key(post_id: Uuid) -> String {
    format!("feat:post:{post_id}")
}

pub fn vocabulary_key() -> &'static str {
    "vocab:current"
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the cached value, or None on miss or any cache failure.
    async fn try_get(&self, key: &str) -> Option<String>;

    /// Stores a value with a TTL. Returns false if the write was dropped.
    async fn try_set(&self, key: &str, value: &str, ttl_seconds: u64) -> bool;

    /// Deletes one key. Returns false if the delete was dropped.
    async fn try_del(&self, key: &str) -> bool;

    /// Deletes every key matching a glob pattern. Returns false if the
    /// delete was dropped.
    async fn try_del_pattern(&self, pattern: &str) -> bool;
}

/// Redis-backed cache using a shared connection manager.
#[derive(Clone)]
pub struct RedisCache {
    client: Arc<ConnectionManager>,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::Internal(format!("failed to create Redis client: {e}")))?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Internal(format!("failed to connect to Redis: {e}")))?;

        Ok(Self {
            client: Arc::new(manager),
        })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn try_get(&self, key: &str) -> Option<String> {
        let result: redis::RedisResult<Option<String>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.client.as_ref().clone())
            .await;

        match result {
            Ok(Some(value)) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Ok(None) => {
                debug!(key, "cache miss");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "cache read failed; treating as miss");
                None
            }
        }
    }

    async fn try_set(&self, key: &str, value: &str, ttl_seconds: u64) -> bool {
        let result: redis::RedisResult<()> = redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_seconds)
            .arg(value)
            .query_async(&mut self.client.as_ref().clone())
            .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "cache write failed; dropping");
                false
            }
        }
    }

    async fn try_del(&self, key: &str) -> bool {
        let result: redis::RedisResult<()> = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut self.client.as_ref().clone())
            .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "cache delete failed; dropping");
                false
            }
        }
    }

    async fn try_del_pattern(&self, pattern: &str) -> bool {
        // SCAN is non-blocking unlike KEYS
        let mut cursor: u64 = 0;

        loop {
            let result: redis::RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut self.client.as_ref().clone())
                .await;

            let (next_cursor, keys) = match result {
                Ok(scan) => scan,
                Err(e) => {
                    warn!(pattern, error = %e, "cache scan failed; dropping invalidation");
                    return false;
                }
            };

            if !keys.is_empty() {
                let del: redis::RedisResult<()> = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut self.client.as_ref().clone())
                    .await;

                if let Err(e) = del {
                    warn!(pattern, error = %e, "cache delete failed; dropping invalidation");
                    return false;
                }
            }

            cursor = next_cursor;
            if cursor == 0 {
                return true;
            }
        }
    }
}

/// In-process cache with the same contract as [`RedisCache`]. Used in tests
/// and as a local fallback when no Redis is configured.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn try_get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    async fn try_set(&self, key: &str, value: &str, ttl_seconds: u64) -> bool {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_seconds),
            },
        );
        true
    }

    async fn try_del(&self, key: &str) -> bool {
        self.entries.write().await.remove(key);
        true
    }

    async fn try_del_pattern(&self, pattern: &str) -> bool {
        // Supports the only pattern shape the engine uses: a literal prefix
        // followed by a trailing '*'.
        let prefix = pattern.trim_end_matches('*');
        let mut entries = self.entries.write().await;
        entries.retain(|key, _| !key.starts_with(prefix));
        true
    }
}
