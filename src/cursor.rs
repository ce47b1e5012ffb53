//! Durable block-height cursor.
//!
//! A single persistent counter naming the next unprocessed source-chain
//! block. The scheduler is its only writer; it is persisted only after a
//! block is fully scheduled, so a crash re-emits the half-processed block
//! and the downstream idempotency absorbs the duplicates.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

pub const BLOCK_HEIGHT_CURSOR_KEY: &str = "block_height_cursor";

#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed cursor value {0:?}")]
    Malformed(String),
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Current cursor, `None` when never persisted.
    async fn get(&self) -> Result<Option<u64>, CursorError>;

    async fn set(&self, height: u64) -> Result<(), CursorError>;
}

/// Redis-backed cursor: ASCII decimal under a fixed key, no TTL.
#[derive(Clone)]
pub struct RedisCursor {
    redis: ConnectionManager,
    key: String,
}

impl RedisCursor {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            key: BLOCK_HEIGHT_CURSOR_KEY.to_owned(),
        }
    }
}

#[async_trait]
impl CursorStore for RedisCursor {
    async fn get(&self) -> Result<Option<u64>, CursorError> {
        let mut redis = self.redis.clone();
        let raw: Option<String> = redis.get(&self.key).await?;
        match raw {
            None => Ok(None),
            Some(value) => value
                .parse::<u64>()
                .map(Some)
                .map_err(|_| CursorError::Malformed(value)),
        }
    }

    async fn set(&self, height: u64) -> Result<(), CursorError> {
        let mut redis = self.redis.clone();
        let _: () = redis.set(&self.key, height.to_string()).await?;
        Ok(())
    }
}
