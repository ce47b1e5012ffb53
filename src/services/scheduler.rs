//! Catch-up scheduler.
//!
//! Walks the source chain block by block from the persisted cursor,
//! extracts confirmation messages, expands them through the assembler and
//! publishes relay tasks. The cursor is persisted only after a block is
//! fully scheduled; a restart re-emits the half-processed block and the
//! destination-side idempotency absorbs the duplicates.

use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use tokio_util::sync::CancellationToken;

use crate::core::{Core, CoreError, SourceChainError};
use crate::cursor::{CursorError, CursorStore};
use crate::proto::MSG_CREATE_CONFIRMATION_TYPE_URL;
use crate::proto::rarimocore::MsgCreateConfirmation;
use crate::queue::{QueueError, TaskQueue};
use crate::relay_task::RelayTask;
use crate::util::run_with_backoff;

use super::relayer::MAX_RETRIES;

const RUNNER_NAME: &str = "scheduler_catchup";
const RETRY_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to get the cursor: {0}")]
    Cursor(#[from] CursorError),
    #[error("failed to get transfers: {0}")]
    Core(#[from] CoreError),
    #[error("failed to publish tasks: {0}")]
    Queue(#[from] QueueError),
    #[error("failed to get txs by block height: {0}")]
    Client(#[from] SourceChainError),
}

#[derive(Clone)]
pub struct Scheduler {
    core: Core,
    queue: Arc<dyn TaskQueue>,
    cursor: Arc<dyn CursorStore>,
    start_block: u64,
}

impl Scheduler {
    pub fn new(
        core: Core,
        queue: Arc<dyn TaskQueue>,
        cursor: Arc<dyn CursorStore>,
        start_block: u64,
    ) -> Self {
        Self {
            core,
            queue,
            cursor,
            start_block,
        }
    }

    /// Runs the supervised catch-up loop until cancellation.
    pub async fn run(self, cancellation: CancellationToken) {
        tracing::info!("starting scheduler catchup");
        run_with_backoff(
            RUNNER_NAME,
            cancellation,
            RETRY_PERIOD,
            RETRY_PERIOD,
            RETRY_PERIOD,
            move |token| {
                let scheduler = self.clone();
                async move {
                    let cursor = scheduler.get_cursor().await?;
                    tracing::debug!(cursor, "starting catchup");
                    scheduler.catchup(token, cursor).await?;
                    Ok::<(), SchedulerError>(())
                }
            },
        )
        .await;
    }

    async fn get_cursor(&self) -> Result<u64, SchedulerError> {
        match self.cursor.get().await? {
            Some(cursor) => Ok(cursor),
            None if self.start_block != 0 => {
                tracing::debug!(cursor = self.start_block, "using start block from config");
                Ok(self.start_block)
            }
            None => {
                tracing::debug!("using first block as start block");
                Ok(1)
            }
        }
    }

    /// Processes blocks forward until the chain head (or cancellation).
    /// Returning `Ok` parks the loop for the normal retry period.
    async fn catchup(
        &self,
        cancellation: CancellationToken,
        mut cursor: u64,
    ) -> Result<(), SchedulerError> {
        loop {
            if cancellation.is_cancelled() {
                return Ok(());
            }
            tracing::debug!(cursor, "started processing block");

            let txs = match self.core.client().get_block_txs(cursor).await {
                Ok(txs) => txs,
                Err(err) if err.is_height_unavailable() => {
                    tracing::debug!(cursor, "invalid height, waiting for the next block");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };

            for tx in &txs {
                let messages = tx.body.as_ref().map(|body| body.messages.as_slice());
                for message in messages.unwrap_or_default() {
                    if message.type_url != MSG_CREATE_CONFIRMATION_TYPE_URL {
                        continue;
                    }
                    let msg = match MsgCreateConfirmation::decode(message.value.as_slice()) {
                        Ok(msg) => msg,
                        Err(error) => {
                            tracing::error!(%error, "failed to unmarshal confirmation message");
                            continue;
                        }
                    };
                    self.schedule_relays(&msg.root, &msg.indexes).await?;
                }
            }

            cursor += 1;
            self.cursor.set(cursor).await?;
            tracing::debug!(cursor, "finished processing block");
        }
    }

    /// Expands a confirmation and publishes one task per transfer whose
    /// operation index belongs to `indexes`, as a single batch.
    pub async fn schedule_relays(
        &self,
        confirmation_id: &str,
        indexes: &[String],
    ) -> Result<(), SchedulerError> {
        tracing::info!(merkle_root = confirmation_id, "processing a confirmation");

        let transfers = self.core.get_transfers(confirmation_id).await?;
        let raw_tasks: Vec<Vec<u8>> = transfers
            .iter()
            .filter(|transfer| indexes.contains(&transfer.transfer.origin))
            .map(|transfer| RelayTask::new(transfer, MAX_RETRIES).marshal())
            .collect();

        if raw_tasks.is_empty() {
            tracing::info!(merkle_root = confirmation_id, "no transfers to relay");
            return Ok(());
        }

        let count = raw_tasks.len();
        self.queue.publish_batch(raw_tasks).await?;
        tracing::info!(
            merkle_root = confirmation_id,
            count,
            "scheduled transfers for relay"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::mock::MockSourceChain;
    use crate::core::testing::{CONFIRMATION_ROOT, populated_chain};
    use crate::cursor::mock::MockCursorStore;
    use crate::proto::cosmos::{Tx, TxBody};
    use crate::queue::mock::MockTaskQueue;

    fn confirmation_tx(root: &str, indexes: &[&str]) -> Tx {
        let msg = MsgCreateConfirmation {
            creator: String::new(),
            root: root.to_owned(),
            indexes: indexes.iter().map(|s| s.to_string()).collect(),
            signature_ecdsa: String::new(),
        };
        Tx {
            body: Some(TxBody {
                messages: vec![prost_types::Any {
                    type_url: MSG_CREATE_CONFIRMATION_TYPE_URL.to_owned(),
                    value: msg.encode_to_vec(),
                }],
                memo: String::new(),
                timeout_height: 0,
            }),
            auth_info: None,
            signatures: vec![],
        }
    }

    fn scheduler_with(
        chain: MockSourceChain,
        start_block: u64,
    ) -> (Scheduler, Arc<MockTaskQueue>, Arc<MockCursorStore>) {
        let queue = Arc::new(MockTaskQueue::default());
        let cursor = Arc::new(MockCursorStore::default());
        let scheduler = Scheduler::new(
            Core::new(Arc::new(chain)),
            queue.clone(),
            cursor.clone(),
            start_block,
        );
        (scheduler, queue, cursor)
    }

    fn published_indexes(queue: &MockTaskQueue) -> Vec<String> {
        queue
            .published
            .lock()
            .expect("published lock")
            .iter()
            .map(|raw| {
                RelayTask::unmarshal(raw)
                    .expect("published payloads are tasks")
                    .operation_index
            })
            .collect()
    }

    #[tokio::test]
    async fn schedules_confirmed_transfers_and_advances_cursor() {
        let chain = populated_chain("Ethereum", &["i1", "i2"]);
        chain
            .blocks
            .lock()
            .expect("blocks lock")
            .insert(10, vec![confirmation_tx(CONFIRMATION_ROOT, &["i1", "i2"])]);
        let (scheduler, queue, cursor) = scheduler_with(chain, 10);

        scheduler
            .catchup(CancellationToken::new(), 10)
            .await
            .expect("catchup parks at the head");

        assert_eq!(published_indexes(&queue), vec!["i1", "i2"]);
        // Block 10 processed, block 11 not yet produced.
        assert_eq!(cursor.history.lock().expect("history lock").as_slice(), &[11]);
    }

    #[tokio::test]
    async fn filters_by_confirmation_indexes() {
        let chain = populated_chain("Ethereum", &["i1", "i2"]);
        // The confirmation announces only i2.
        {
            let mut confirmations = chain.confirmations.lock().expect("lock");
            confirmations
                .get_mut(CONFIRMATION_ROOT)
                .expect("confirmation")
                .indexes = vec!["i2".to_owned()];
        }
        chain
            .blocks
            .lock()
            .expect("blocks lock")
            .insert(1, vec![confirmation_tx(CONFIRMATION_ROOT, &["i2"])]);
        let (scheduler, queue, _) = scheduler_with(chain, 1);

        scheduler
            .catchup(CancellationToken::new(), 1)
            .await
            .expect("catchup");

        assert_eq!(published_indexes(&queue), vec!["i2"]);
    }

    #[tokio::test]
    async fn unavailable_height_parks_without_moving_the_cursor() {
        let chain = MockSourceChain::default();
        let (scheduler, queue, cursor) = scheduler_with(chain, 10_000);

        scheduler
            .catchup(CancellationToken::new(), 10_000)
            .await
            .expect("parks on invalid height");

        assert!(queue.published.lock().expect("lock").is_empty());
        assert!(cursor.history.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn empty_blocks_advance_without_publishing() {
        let chain = MockSourceChain::default();
        {
            let mut blocks = chain.blocks.lock().expect("blocks lock");
            blocks.insert(5, vec![]);
            blocks.insert(6, vec![]);
        }
        let (scheduler, queue, cursor) = scheduler_with(chain, 5);

        scheduler
            .catchup(CancellationToken::new(), 5)
            .await
            .expect("catchup");

        assert!(queue.published.lock().expect("lock").is_empty());
        let history = cursor.history.lock().expect("lock").clone();
        assert_eq!(history, vec![6, 7]);
        assert!(history.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test]
    async fn publish_failure_leaves_cursor_unchanged() {
        let chain = populated_chain("Ethereum", &["i1"]);
        chain
            .blocks
            .lock()
            .expect("blocks lock")
            .insert(3, vec![confirmation_tx(CONFIRMATION_ROOT, &["i1"])]);
        let (scheduler, queue, cursor) = scheduler_with(chain, 3);
        queue
            .fail_publish
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let result = scheduler.catchup(CancellationToken::new(), 3).await;
        assert!(matches!(result, Err(SchedulerError::Queue(_))));
        assert!(cursor.history.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn rescheduling_the_same_block_is_deterministic() {
        let chain = populated_chain("Ethereum", &["i1", "i2"]);
        chain
            .blocks
            .lock()
            .expect("blocks lock")
            .insert(2, vec![confirmation_tx(CONFIRMATION_ROOT, &["i1", "i2"])]);
        let (scheduler, queue, _) = scheduler_with(chain, 2);

        scheduler
            .catchup(CancellationToken::new(), 2)
            .await
            .expect("first run");
        let first = published_indexes(&queue);
        queue.published.lock().expect("lock").clear();

        scheduler
            .catchup(CancellationToken::new(), 2)
            .await
            .expect("second run");
        assert_eq!(first, published_indexes(&queue));
    }

    #[tokio::test]
    async fn falls_back_to_config_start_block() {
        let (scheduler, _, _) = scheduler_with(MockSourceChain::default(), 42);
        assert_eq!(scheduler.get_cursor().await.expect("cursor"), 42);

        let (scheduler, _, cursor) = scheduler_with(MockSourceChain::default(), 0);
        assert_eq!(scheduler.get_cursor().await.expect("cursor"), 1);

        cursor.set(17).await.expect("set");
        let (scheduler, _, _) = {
            let chain = MockSourceChain::default();
            let queue = Arc::new(MockTaskQueue::default());
            let scheduler =
                Scheduler::new(Core::new(Arc::new(chain)), queue.clone(), cursor.clone(), 42);
            (scheduler, queue, cursor)
        };
        assert_eq!(scheduler.get_cursor().await.expect("cursor"), 17);
    }
}
