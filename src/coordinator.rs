//! The Coordinator (née `Indexer`): decides which block numbers to enqueue,
//! at startup and forever after. It never touches block data itself, that
//! is the Block Worker Pool's job.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::ChainClient;
use crate::error::IndexerError;
use crate::queue::{Task, TaskQueue};
use crate::store::Store;

/// How long the tip-follow loop sleeps after observing that the next block
/// does not exist yet.
const TIP_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct Coordinator {
    store: Arc<dyn Store>,
    chain: Arc<dyn ChainClient>,
    queue: Arc<dyn TaskQueue>,
    block_queue_name: String,
    tx_receipt_queue_name: String,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn Store>,
        chain: Arc<dyn ChainClient>,
        queue: Arc<dyn TaskQueue>,
        block_queue_name: String,
        tx_receipt_queue_name: String,
    ) -> Self {
        Self {
            store,
            chain,
            queue,
            block_queue_name,
            tx_receipt_queue_name,
        }
    }

    /// Runs the startup protocol (receipt resume, head discovery, gap
    /// computation) and then the tip-follow loop, forever. Returns only on
    /// an unrecoverable error; the supervisor treats that as fatal.
    #[tracing::instrument(name = "coordinator::run", skip_all)]
    pub async fn run(&self) -> Result<(), IndexerError> {
        self.resume_pending_receipts().await?;

        let head = self.chain.head_number().await?;
        self.fill_gaps(head).await?;

        self.tip_follow().await
    }

    /// Step 1: re-enqueue a receipt task for every transaction still
    /// missing one. Recovers work lost across a restart.
    pub async fn resume_pending_receipts(&self) -> Result<(), IndexerError> {
        let pending = self.store.list_pending_receipt_hashes().await?;
        tracing::info!(count = pending.len(), "resuming pending receipt tasks");
        for tx_hash in pending {
            self.queue
                .publish(&self.tx_receipt_queue_name, &Task::FetchReceipt { tx_hash })
                .await?;
        }
        Ok(())
    }

    /// Steps 2-3: enqueue every block number in `[0, head]` not already
    /// present in the Store, newest first.
    pub async fn fill_gaps(&self, head: u64) -> Result<(), IndexerError> {
        let known: HashSet<u64> = self.store.list_known_block_numbers().await?.into_iter().collect();
        tracing::info!(head, known = known.len(), "computing backfill gaps");

        // Descending from `head` down to and including 0. `n` is u64, so the
        // loop counts down via an inclusive range reversed rather than
        // subtracting past zero.
        for n in (0..=head).rev() {
            if !known.contains(&n) {
                self.queue
                    .publish(&self.block_queue_name, &Task::IndexBlock { number: n })
                    .await?;
            }
        }
        Ok(())
    }

    /// Step 4: follow the chain tip forever, enqueueing each new block
    /// number as it appears.
    async fn tip_follow(&self) -> Result<(), IndexerError> {
        let mut next = self.store.latest_block_number().await?.map(|n| n + 1).unwrap_or(0);

        loop {
            match self.chain.header_by_number(next).await {
                Ok(header) => {
                    // Reorg policy (best-effort): if the header's parent
                    // doesn't match what we have on record for `next - 1`,
                    // enqueue it anyway. The Block Worker's hash-uniqueness
                    // check treats the new hash as a new row; the old row
                    // is never pruned.
                    tracing::debug!(number = next, hash = %header.hash, "tip advanced");
                    self.queue
                        .publish(&self.block_queue_name, &Task::IndexBlock { number: next })
                        .await?;
                    next += 1;
                }
                Err(crate::error::ChainClientError::HeaderNotFound(_)) => {
                    tokio::time::sleep(TIP_POLL_INTERVAL).await;
                }
                Err(err) => {
                    tracing::warn!(error = %err, number = next, "tip-follow RPC error, retrying");
                    tokio::time::sleep(TIP_POLL_INTERVAL).await;
                }
            }
        }
    }
}
