//! The Receipt Worker Pool: for each receipt task, attach receipt logs to
//! the existing Transaction row.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::TxHash;
use tokio::sync::watch;

use crate::chain::ChainClient;
use crate::error::IndexerError;
use crate::model::TransactionLog;
use crate::queue::{Task, TaskQueue};
use crate::store::Store;

const CONSUME_RETRY_BACKOFF: Duration = Duration::from_secs(1);

pub struct ReceiptWorkerPool {
    store: Arc<dyn Store>,
    chain: Arc<dyn ChainClient>,
    queue: Arc<dyn TaskQueue>,
    queue_name: String,
    concurrency: usize,
    shutdown: watch::Receiver<bool>,
}

impl ReceiptWorkerPool {
    pub fn new(
        store: Arc<dyn Store>,
        chain: Arc<dyn ChainClient>,
        queue: Arc<dyn TaskQueue>,
        queue_name: String,
        concurrency: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            chain,
            queue,
            queue_name,
            concurrency,
            shutdown,
        })
    }

    pub async fn run(self: Arc<Self>) -> Result<(), IndexerError> {
        let mut handles = Vec::with_capacity(self.concurrency);
        for id in 0..self.concurrency {
            let this = Arc::clone(&self);
            handles.push(tokio::spawn(async move { this.worker_loop(id).await }));
        }
        for handle in handles {
            handle.await.map_err(|e| {
                IndexerError::MalformedPayload(format!("receipt worker panicked: {e}"))
            })?;
        }
        Ok(())
    }

    async fn worker_loop(&self, id: usize) {
        let mut shutdown = self.shutdown.clone();
        loop {
            if *shutdown.borrow() {
                return;
            }

            let delivery = tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                res = self.queue.consume(&self.queue_name) => match res {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) => continue,
                    Err(err) => {
                        tracing::warn!(worker = id, error = %err, "receipt queue consume error");
                        tokio::time::sleep(CONSUME_RETRY_BACKOFF).await;
                        continue;
                    }
                },
            };

            match self.process(&delivery.raw_payload).await {
                Ok(()) => {
                    if let Err(err) = self.queue.ack(&self.queue_name, &delivery).await {
                        tracing::error!(worker = id, error = %err, "failed to ack receipt delivery");
                    }
                }
                Err(err) => {
                    if err.is_permanent() {
                        tracing::error!(worker = id, error = %err, "unrecoverable receipt task, rejecting");
                    } else {
                        tracing::debug!(worker = id, error = %err, "receipt task failed, rejecting");
                    }
                    if let Err(ack_err) = self.queue.reject(&self.queue_name, &delivery).await {
                        tracing::error!(worker = id, error = %ack_err, "failed to reject receipt delivery");
                    }
                }
            }
        }
    }

    /// Decodes and runs a single receipt task. Public so tests can drive the
    /// pool's real logic one delivery at a time without spinning up its
    /// background consumer loops.
    #[tracing::instrument(name = "receipt_worker::process", skip(self, raw_payload))]
    pub async fn process(&self, raw_payload: &str) -> Result<(), IndexerError> {
        let tx_hash_str = match serde_json::from_str::<Task>(raw_payload)
            .map_err(|e| IndexerError::MalformedPayload(e.to_string()))?
        {
            Task::FetchReceipt { tx_hash } => tx_hash,
            other => {
                return Err(IndexerError::MalformedPayload(format!(
                    "expected FetchReceipt task on receipt queue, got {other:?}"
                )))
            }
        };

        let tx_hash = TxHash::from_str(&tx_hash_str)
            .map_err(|e| IndexerError::MalformedPayload(format!("bad tx hash: {e}")))?;

        let receipt = self.chain.transaction_receipt(tx_hash).await?;

        let logs: Vec<TransactionLog> = receipt
            .logs
            .into_iter()
            .map(|log| TransactionLog {
                address: log.address,
                topics: log.topics,
                data: log.data,
                log_index: log.log_index,
            })
            .collect();

        self.store
            .update_transaction_receipt(&tx_hash_str, &logs)
            .await?;

        Ok(())
    }
}
