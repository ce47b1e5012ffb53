//! Consumer pool draining the relay queue.
//!
//! A fixed pool of workers shares the delivery stream. Each worker owns
//! one delivery at a time: re-hydrate the transfer against the source
//! chain, resolve the destination executor, withdraw, then ack or reject.
//! Rejections republish with a decremented retry budget unless the error
//! is permanent. A panicking worker logs and moves on to the next
//! delivery.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt as _;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use prost::Message as _;

use crate::bridger::{BridgerError, BridgerResolver};
use crate::core::{Core, SourceChainError, TransferDetails};
use crate::proto::rarimocore::{OpStatus, Transfer};
use crate::queue::{Delivery, QueueError, RelayQueue, TaskQueue};
use crate::relay_task::{RelayTask, RelayTaskError};

/// Default retry budget of scheduled tasks. Zero disables retries; the
/// republish plumbing stays in place for tuning.
pub const MAX_RETRIES: u32 = 0;

const PREFETCH_LIMIT: usize = 10;
const POLL_DURATION: Duration = Duration::from_millis(100);
const NUM_CONSUMERS: usize = 100;

#[derive(Debug, thiserror::Error)]
enum ProcessError {
    #[error("transfer is not signed yet")]
    NotSigned,
    #[error("failed to decode the transfer: {0}")]
    MalformedTransfer(#[from] prost::DecodeError),
    #[error(transparent)]
    MalformedTask(#[from] RelayTaskError),
    #[error(transparent)]
    Client(#[from] SourceChainError),
    #[error(transparent)]
    Bridger(#[from] BridgerError),
}

impl ProcessError {
    fn is_permanent(&self) -> bool {
        match self {
            ProcessError::Bridger(err) => err.is_permanent(),
            ProcessError::MalformedTransfer(_) | ProcessError::MalformedTask(_) => true,
            ProcessError::NotSigned | ProcessError::Client(_) => false,
        }
    }
}

/// What to do with a delivery after processing.
#[derive(Debug, PartialEq)]
enum Disposition {
    Ack,
    Reject { republish: Option<RelayTask> },
}

fn disposition(task: RelayTask, result: &Result<(), ProcessError>) -> Disposition {
    match result {
        Ok(()) => Disposition::Ack,
        Err(ProcessError::Bridger(BridgerError::AlreadyWithdrawn)) => Disposition::Ack,
        Err(err) if err.is_permanent() => Disposition::Reject { republish: None },
        Err(_) => Disposition::Reject {
            republish: task.into_retry(),
        },
    }
}

pub struct Relayer {
    core: Core,
    queue: RelayQueue,
    bridgers: Arc<dyn BridgerResolver>,
}

impl Relayer {
    pub fn new(core: Core, queue: RelayQueue, bridgers: Arc<dyn BridgerResolver>) -> Self {
        Self {
            core,
            queue,
            bridgers,
        }
    }

    /// Starts consumption and blocks until cancellation drains the pool.
    pub async fn run(self, cancellation: CancellationToken) -> Result<(), QueueError> {
        let receiver = self
            .queue
            .start_consuming(PREFETCH_LIMIT, POLL_DURATION, cancellation.clone())
            .await?;
        let receiver = Arc::new(Mutex::new(receiver));

        let tracker = TaskTracker::new();
        for i in 0..NUM_CONSUMERS {
            let consumer = Consumer {
                id: format!("relay-consumer-{i}"),
                core: self.core.clone(),
                republish: Arc::new(self.queue.clone()),
                bridgers: self.bridgers.clone(),
            };
            tracker.spawn(consumer.run(receiver.clone(), cancellation.clone()));
        }
        tracker.close();
        tracker.wait().await;
        tracing::info!("finished consuming relayer queue");
        Ok(())
    }
}

struct Consumer {
    id: String,
    core: Core,
    republish: Arc<dyn TaskQueue>,
    bridgers: Arc<dyn BridgerResolver>,
}

impl Consumer {
    async fn run(
        self,
        receiver: Arc<Mutex<mpsc::Receiver<Delivery>>>,
        cancellation: CancellationToken,
    ) {
        loop {
            let delivery = {
                let mut receiver = receiver.lock().await;
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    delivery = receiver.recv() => match delivery {
                        Some(delivery) => delivery,
                        None => return,
                    },
                }
            };

            // The Go ancestor recovers worker panics; mirror that so one
            // poisoned delivery cannot take the pool down.
            let outcome = std::panic::AssertUnwindSafe(self.consume(delivery))
                .catch_unwind()
                .await;
            if outcome.is_err() {
                tracing::error!(consumer = self.id, "relayer panicked");
            }
        }
    }

    async fn consume(&self, delivery: Delivery) {
        let task = match RelayTask::unmarshal(delivery.payload()) {
            Ok(task) => task,
            Err(error) => {
                tracing::error!(consumer = self.id, %error, "malformed task payload, dropping");
                reject(delivery).await;
                return;
            }
        };

        let result = self.process_transfer(&task).await;
        match disposition(task.clone(), &result) {
            Disposition::Ack => {
                if let Err(ProcessError::Bridger(BridgerError::AlreadyWithdrawn)) = result {
                    tracing::info!(
                        transfer_id = task.operation_index,
                        "transfer was already withdrawn"
                    );
                }
                if let Err(error) = delivery.ack().await {
                    tracing::error!(
                        transfer_id = task.operation_index,
                        %error,
                        "failed to ack the transfer"
                    );
                }
            }
            Disposition::Reject { republish } => {
                let error = result.expect_err("rejected deliveries carry an error");
                tracing::error!(
                    transfer_id = task.operation_index,
                    %error,
                    "failed to process transfer"
                );
                reject(delivery).await;
                if let Some(retry) = republish {
                    // TODO: exponential backoff and a dead-letter queue
                    // once the retry policy grows error classes.
                    if let Err(error) = self.republish.publish(retry.marshal()).await {
                        tracing::error!(
                            transfer_id = retry.operation_index,
                            %error,
                            "failed to schedule the retry"
                        );
                    }
                }
            }
        }
    }

    async fn process_transfer(&self, task: &RelayTask) -> Result<(), ProcessError> {
        tracing::info!(op_id = task.operation_index, "processing a transfer");

        let client = self.core.client();
        let operation = client.operation(&task.operation_index).await?;
        if operation.status() != OpStatus::Signed {
            return Err(ProcessError::NotSigned);
        }

        let details = operation.details.as_ref().map(|any| any.value.as_slice());
        let transfer = Transfer::decode(details.unwrap_or_default())?;
        let to = transfer.to.clone().unwrap_or_default();

        let item = client
            .item_by_on_chain_item(&to.chain, &to.address, &to.token_id)
            .await?;
        let collection = client.collection(&item.collection).await?;
        let collection_data = client.collection_data(&to.chain, &collection.index).await?;

        let details = TransferDetails {
            transfer,
            collection,
            collection_data,
            item,
            signature: task.signature.clone(),
            origin: task.origin.clone(),
            merkle_path: task.parse_merkle_path()?,
        };

        tracing::info!(
            op_id = task.operation_index,
            to = details.transfer.receiver,
            token_type = details.collection_data.token_type,
            to_chain = details.to_chain(),
            "relaying a transfer"
        );

        let bridger = self.bridgers.resolve(details.to_chain())?;
        bridger.withdraw(&details).await?;
        Ok(())
    }
}

async fn reject(delivery: Delivery) {
    if let Err(error) = delivery.reject().await {
        tracing::error!(%error, "failed to reject the task");
    }
}
