//! The Block Worker Pool: for each block task, fetch the block, persist it
//! and its transactions, and fan out one receipt task per transaction.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::chain::{recover_sender, ChainClient};
use crate::error::IndexerError;
use crate::model::{Block, Transaction};
use crate::queue::{Delivery, Task, TaskQueue};
use crate::store::Store;

/// How long a worker sleeps after a queue connectivity error before
/// retrying `consume`, so a dead broker doesn't spin the pool in a tight
/// loop.
const CONSUME_RETRY_BACKOFF: Duration = Duration::from_secs(1);

pub struct BlockWorkerPool {
    store: Arc<dyn Store>,
    chain: Arc<dyn ChainClient>,
    queue: Arc<dyn TaskQueue>,
    block_queue_name: String,
    tx_receipt_queue_name: String,
    concurrency: usize,
    shutdown: watch::Receiver<bool>,
}

impl BlockWorkerPool {
    pub fn new(
        store: Arc<dyn Store>,
        chain: Arc<dyn ChainClient>,
        queue: Arc<dyn TaskQueue>,
        block_queue_name: String,
        tx_receipt_queue_name: String,
        concurrency: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            chain,
            queue,
            block_queue_name,
            tx_receipt_queue_name,
            concurrency,
            shutdown,
        })
    }

    /// Spawns `concurrency` consumer tasks and waits on all of them. A
    /// worker only returns on a panic; ordinary processing errors are
    /// handled per-delivery (reject) and never unwind the loop.
    pub async fn run(self: Arc<Self>) -> Result<(), IndexerError> {
        let mut handles = Vec::with_capacity(self.concurrency);
        for id in 0..self.concurrency {
            let this = Arc::clone(&self);
            handles.push(tokio::spawn(async move { this.worker_loop(id).await }));
        }
        for handle in handles {
            handle
                .await
                .map_err(|e| IndexerError::MalformedPayload(format!("block worker panicked: {e}")))?;
        }
        Ok(())
    }

    async fn worker_loop(&self, id: usize) {
        let mut shutdown = self.shutdown.clone();
        loop {
            if *shutdown.borrow() {
                // Stop accepting new deliveries; any delivery already being
                // processed above this point runs to completion first.
                return;
            }

            let delivery = tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                res = self.queue.consume(&self.block_queue_name) => match res {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) => continue,
                    Err(err) => {
                        tracing::warn!(worker = id, error = %err, "block queue consume error");
                        tokio::time::sleep(CONSUME_RETRY_BACKOFF).await;
                        continue;
                    }
                },
            };

            match self.process(&delivery.raw_payload).await {
                Ok(()) => {
                    if let Err(err) = self.queue.ack(&self.block_queue_name, &delivery).await {
                        tracing::error!(worker = id, error = %err, "failed to ack block delivery");
                    }
                }
                Err(err) => {
                    // Permanent payload errors (bad encoding, unrecoverable
                    // signature) get logged louder: without a poison-pill
                    // guard these loop reject/requeue forever and are worth
                    // an operator's attention.
                    if err.is_permanent() {
                        tracing::error!(worker = id, error = %err, "unrecoverable block task, rejecting");
                    } else {
                        tracing::warn!(worker = id, error = %err, "block task failed, rejecting");
                    }
                    if let Err(ack_err) = self.queue.reject(&self.block_queue_name, &delivery).await {
                        tracing::error!(worker = id, error = %ack_err, "failed to reject block delivery");
                    }
                }
            }
        }
    }

    /// Decodes and runs a single block task: fetch, persist, fan out receipt
    /// tasks. Public so tests can drive the pool's real logic one delivery
    /// at a time without spinning up its background consumer loops.
    #[tracing::instrument(name = "block_worker::process", skip(self, raw_payload))]
    pub async fn process(&self, raw_payload: &str) -> Result<(), IndexerError> {
        let number = match serde_json::from_str::<Task>(raw_payload)
            .map_err(|e| IndexerError::MalformedPayload(e.to_string()))?
        {
            Task::IndexBlock { number } => number,
            other => {
                return Err(IndexerError::MalformedPayload(format!(
                    "expected IndexBlock task on block queue, got {other:?}"
                )))
            }
        };

        let block = self.chain.block_by_number(number).await?;

        if self.store.count_block_by_hash(&block.hash.to_string()).await? {
            // Already persisted: a requeued or duplicate delivery. Ack, not
            // an error.
            return Ok(());
        }

        let block_row = Block::new(block.hash, block.number, block.timestamp, block.parent_hash);

        let mut tx_rows = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            let unsigned = tx.unsigned();
            let from = recover_sender(&unsigned, &tx.signature, tx.chain_id)?;

            self.queue
                .publish(
                    &self.tx_receipt_queue_name,
                    &Task::FetchReceipt {
                        tx_hash: tx.hash.to_string(),
                    },
                )
                .await?;

            tx_rows.push(Transaction::new_pending(
                tx.hash, block.hash, from, tx.to, tx.nonce, &tx.input, tx.value,
            ));
        }

        self.store
            .insert_block_with_transactions(&block_row, &tx_rows)
            .await?;

        Ok(())
    }
}
