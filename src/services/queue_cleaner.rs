//! Periodic queue maintenance.
//!
//! The only mechanism that removes unacknowledgeable deliveries: unacked
//! payloads of dead consumer connections go back to the ready list, then
//! the ready backlog and the rejected list are drained.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::queue::{QueueError, RelayQueue};
use crate::util::run_with_backoff;

const RUNNER_NAME: &str = "queue_cleaner";
const CLEAN_PERIOD: Duration = Duration::from_secs(10 * 60);
const MIN_ABNORMAL_PERIOD: Duration = Duration::from_secs(10);
const MAX_ABNORMAL_PERIOD: Duration = Duration::from_secs(60);

pub struct QueueCleaner {
    queue: RelayQueue,
}

impl QueueCleaner {
    pub fn new(queue: RelayQueue) -> Self {
        Self { queue }
    }

    pub async fn run(self, cancellation: CancellationToken) {
        run_with_backoff(
            RUNNER_NAME,
            cancellation,
            CLEAN_PERIOD,
            MIN_ABNORMAL_PERIOD,
            MAX_ABNORMAL_PERIOD,
            move |_| {
                let queue = self.queue.clone();
                async move { run_once(&queue).await }
            },
        )
        .await;
    }
}

async fn run_once(queue: &RelayQueue) -> Result<(), QueueError> {
    let stuck = queue.clean_stuck().await?;
    let ready = queue.purge_ready().await?;
    let rejected = queue.purge_rejected().await?;
    tracing::info!(stuck, ready, rejected, "cleaned queue jobs");
    Ok(())
}
