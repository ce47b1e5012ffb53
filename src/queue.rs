//! Durable at-least-once relay queue over Redis lists.
//!
//! Layout per queue:
//! - `ready` list — published, not yet delivered payloads;
//! - `connection:{id}:unacked` list — payloads taken by a live consumer
//!   connection and neither acked nor rejected yet;
//! - `rejected` list — terminally rejected payloads, drained by the
//!   cleaner;
//! - `connections` set + per-connection `heartbeat` key with TTL — the
//!   liveness record [`RelayQueue::clean_stuck`] uses to re-queue
//!   deliveries abandoned by a dead consumer.
//!
//! Publishing LPUSHes, delivery RPOPLPUSHes into the connection's unacked
//! list, so ordering is FIFO per queue and a crash between pop and ack
//! loses nothing. Acking is an LREM on the unacked list; rejection moves
//! the payload to the rejected list. Delivery is at-least-once: consumers
//! must tolerate replays.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Queue the scheduler and the consumer pool share.
pub const RELAY_QUEUE_NAME: &str = "relay_tasks";

const KEY_PREFIX: &str = "relayer:queue";
const HEARTBEAT_TTL: Duration = Duration::from_secs(45);

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),
}

fn ready_key(name: &str) -> String {
    format!("{KEY_PREFIX}:{name}:ready")
}

fn rejected_key(name: &str) -> String {
    format!("{KEY_PREFIX}:{name}:rejected")
}

fn connections_key(name: &str) -> String {
    format!("{KEY_PREFIX}:{name}:connections")
}

fn unacked_key(name: &str, connection: &str) -> String {
    format!("{KEY_PREFIX}:{name}:connection:{connection}:unacked")
}

fn heartbeat_key(name: &str, connection: &str) -> String {
    format!("{KEY_PREFIX}:{name}:connection:{connection}:heartbeat")
}

/// Publish side of the queue. The scheduler and the admin API depend on
/// this seam only, which keeps them testable without Redis.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError>;

    /// Publishes all payloads preserving their order. Empty batches no-op.
    async fn publish_batch(&self, payloads: Vec<Vec<u8>>) -> Result<(), QueueError>;
}

/// One taken delivery. Dropping it without [`Delivery::ack`] or
/// [`Delivery::reject`] leaves the payload in the unacked list for the
/// cleaner to reclaim.
pub struct Delivery {
    payload: Vec<u8>,
    redis: ConnectionManager,
    unacked_key: String,
    rejected_key: String,
}

impl Delivery {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub async fn ack(mut self) -> Result<(), QueueError> {
        let _: i64 = self
            .redis
            .lrem(&self.unacked_key, 1, self.payload.as_slice())
            .await?;
        Ok(())
    }

    pub async fn reject(mut self) -> Result<(), QueueError> {
        let _: i64 = self
            .redis
            .lpush(&self.rejected_key, self.payload.as_slice())
            .await?;
        let _: i64 = self
            .redis
            .lrem(&self.unacked_key, 1, self.payload.as_slice())
            .await?;
        Ok(())
    }
}

/// Redis-backed relay queue handle. Cheap to clone.
#[derive(Clone)]
pub struct RelayQueue {
    redis: ConnectionManager,
    name: String,
    connection: String,
}

impl RelayQueue {
    pub fn new(redis: ConnectionManager, name: &str) -> Self {
        Self {
            redis,
            name: name.to_owned(),
            connection: format!("{}-{}", env!("CARGO_PKG_NAME"), std::process::id()),
        }
    }

    fn ready_key(&self) -> String {
        ready_key(&self.name)
    }

    fn rejected_key(&self) -> String {
        rejected_key(&self.name)
    }

    fn connections_key(&self) -> String {
        connections_key(&self.name)
    }

    fn unacked_key(&self, connection: &str) -> String {
        unacked_key(&self.name, connection)
    }

    fn heartbeat_key(&self, connection: &str) -> String {
        heartbeat_key(&self.name, connection)
    }

    /// Registers this connection and starts the delivery poller.
    ///
    /// Up to `prefetch` deliveries are in flight at a time; the poller
    /// sleeps `poll_interval` when the ready list is empty and stops when
    /// `cancellation` fires, leaving unacked deliveries to the cleaner.
    pub async fn start_consuming(
        &self,
        prefetch: usize,
        poll_interval: Duration,
        cancellation: CancellationToken,
    ) -> Result<mpsc::Receiver<Delivery>, QueueError> {
        let mut redis = self.redis.clone();
        let ready_key = self.ready_key();
        let rejected_key = self.rejected_key();
        let unacked_key = self.unacked_key(&self.connection);
        let heartbeat_key = self.heartbeat_key(&self.connection);

        let _: i64 = redis
            .sadd(self.connections_key(), &self.connection)
            .await?;
        let _: () = redis
            .set_ex(&heartbeat_key, 1, HEARTBEAT_TTL.as_secs())
            .await?;

        let (sender, receiver) = mpsc::channel(prefetch.max(1));
        tokio::spawn(async move {
            let mut last_beat = tokio::time::Instant::now();
            loop {
                if cancellation.is_cancelled() {
                    return;
                }
                if last_beat.elapsed() > HEARTBEAT_TTL / 3 {
                    let beat: Result<(), _> = redis
                        .set_ex(&heartbeat_key, 1, HEARTBEAT_TTL.as_secs())
                        .await;
                    if let Err(error) = beat {
                        tracing::warn!(error = %error, "failed to refresh consumer heartbeat");
                    }
                    last_beat = tokio::time::Instant::now();
                }

                let popped: Result<Option<Vec<u8>>, _> =
                    redis.rpoplpush(&ready_key, &unacked_key).await;
                match popped {
                    Ok(Some(payload)) => {
                        let delivery = Delivery {
                            payload,
                            redis: redis.clone(),
                            unacked_key: unacked_key.clone(),
                            rejected_key: rejected_key.clone(),
                        };
                        // Blocks while all consumers are busy; that is the
                        // prefetch bound.
                        if sender.send(delivery).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        tokio::select! {
                            _ = cancellation.cancelled() => return,
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                    Err(error) => {
                        tracing::error!(error = %error, "failed to poll the relay queue");
                        tokio::select! {
                            _ = cancellation.cancelled() => return,
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                }
            }
        });

        Ok(receiver)
    }

    /// Drains the un-delivered backlog. Returns the number of payloads
    /// dropped.
    pub async fn purge_ready(&self) -> Result<u64, QueueError> {
        self.purge(&self.ready_key()).await
    }

    /// Drains terminally rejected payloads.
    pub async fn purge_rejected(&self) -> Result<u64, QueueError> {
        self.purge(&self.rejected_key()).await
    }

    async fn purge(&self, key: &str) -> Result<u64, QueueError> {
        let mut redis = self.redis.clone();
        let count: u64 = redis.llen(key).await?;
        let _: i64 = redis.del(key).await?;
        Ok(count)
    }

    /// Re-queues deliveries held by connections whose heartbeat expired.
    /// Returns the number of payloads returned to the ready list.
    pub async fn clean_stuck(&self) -> Result<u64, QueueError> {
        let mut redis = self.redis.clone();
        let connections: Vec<String> = redis.smembers(self.connections_key()).await?;

        let mut requeued = 0u64;
        for connection in connections {
            if connection == self.connection {
                continue;
            }
            let alive: bool = redis.exists(self.heartbeat_key(&connection)).await?;
            if alive {
                continue;
            }

            let unacked_key = self.unacked_key(&connection);
            loop {
                let moved: Option<Vec<u8>> =
                    redis.rpoplpush(&unacked_key, self.ready_key()).await?;
                if moved.is_none() {
                    break;
                }
                requeued += 1;
            }
            let _: i64 = redis
                .srem(self.connections_key(), &connection)
                .await?;
        }

        Ok(requeued)
    }
}

#[async_trait]
impl TaskQueue for RelayQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError> {
        let mut redis = self.redis.clone();
        let _: i64 = redis.lpush(self.ready_key(), payload.as_slice()).await?;
        Ok(())
    }

    async fn publish_batch(&self, payloads: Vec<Vec<u8>>) -> Result<(), QueueError> {
        if payloads.is_empty() {
            return Ok(());
        }
        let mut redis = self.redis.clone();
        let _: i64 = redis.lpush(self.ready_key(), payloads).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Collects published payloads in memory.
    #[derive(Default)]
    pub struct MockTaskQueue {
        pub published: Mutex<Vec<Vec<u8>>>,
        pub fail_publish: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl TaskQueue for MockTaskQueue {
        async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError> {
            self.publish_batch(vec![payload]).await
        }

        async fn publish_batch(&self, payloads: Vec<Vec<u8>>) -> Result<(), QueueError> {
            if self.fail_publish.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(QueueError::Redis(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "mock publish failure",
                ))));
            }
            self.published
                .lock()
                .expect("published lock")
                .extend(payloads);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_per_queue() {
        assert_eq!(
            ready_key(RELAY_QUEUE_NAME),
            "relayer:queue:relay_tasks:ready"
        );
        assert_eq!(
            rejected_key(RELAY_QUEUE_NAME),
            "relayer:queue:relay_tasks:rejected"
        );
        assert_eq!(
            connections_key(RELAY_QUEUE_NAME),
            "relayer:queue:relay_tasks:connections"
        );
        assert_eq!(
            unacked_key(RELAY_QUEUE_NAME, "relayer-rs-1"),
            "relayer:queue:relay_tasks:connection:relayer-rs-1:unacked"
        );
        assert_eq!(
            heartbeat_key(RELAY_QUEUE_NAME, "relayer-rs-2"),
            "relayer:queue:relay_tasks:connection:relayer-rs-2:heartbeat"
        );
    }
}
