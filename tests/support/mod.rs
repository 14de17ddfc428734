//! In-memory fakes for the ingestion pipeline's three external seams
//! (chain client, store, task queue), used by the integration tests in this
//! directory to exercise ingestion invariants and scenarios without a live
//! node, database, or broker.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};

use chain_indexer::chain::{ChainBlock, ChainClient, ChainHeader, ChainReceipt};
use chain_indexer::error::{ChainClientError, QueueError, StoreError};
use chain_indexer::model::{Block, BlockSummary, Transaction, TransactionLog};
use chain_indexer::queue::{Delivery, QueueStats, Task, TaskQueue};
use chain_indexer::store::{BlockId, Store};
use chain_indexer::workers::{BlockWorkerPool, ReceiptWorkerPool};

/// A chain whose blocks and receipts are seeded up front; `head_number`
/// reflects the highest seeded block unless overridden, and [`FakeChainClient::push_block`]
/// lets a test simulate the tip advancing mid-run.
#[derive(Default)]
pub struct FakeChainClient {
    inner: Mutex<FakeChainInner>,
}

#[derive(Default)]
struct FakeChainInner {
    blocks: HashMap<u64, ChainBlock>,
    receipts: HashMap<String, ChainReceipt>,
}

impl FakeChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_block(&self, block: ChainBlock) {
        let mut inner = self.inner.lock().await;
        inner.blocks.insert(block.number, block);
    }

    pub async fn seed_receipt(&self, tx_hash: String, receipt: ChainReceipt) {
        let mut inner = self.inner.lock().await;
        inner.receipts.insert(tx_hash, receipt);
    }
}

#[async_trait]
impl ChainClient for FakeChainClient {
    async fn head_number(&self) -> Result<u64, ChainClientError> {
        let inner = self.inner.lock().await;
        inner.blocks.keys().max().copied().ok_or(ChainClientError::BlockNotFound(0))
    }

    async fn block_by_number(&self, number: u64) -> Result<ChainBlock, ChainClientError> {
        let inner = self.inner.lock().await;
        inner
            .blocks
            .get(&number)
            .cloned()
            .ok_or(ChainClientError::BlockNotFound(number))
    }

    async fn header_by_number(&self, number: u64) -> Result<ChainHeader, ChainClientError> {
        let inner = self.inner.lock().await;
        inner
            .blocks
            .get(&number)
            .map(|b| ChainHeader {
                number: b.number,
                hash: b.hash,
                parent_hash: b.parent_hash,
            })
            .ok_or(ChainClientError::HeaderNotFound(number))
    }

    async fn transaction_receipt(
        &self,
        hash: alloy_primitives::TxHash,
    ) -> Result<ChainReceipt, ChainClientError> {
        let inner = self.inner.lock().await;
        inner
            .receipts
            .get(&hash.to_string())
            .cloned()
            .ok_or(ChainClientError::ReceiptNotFound(hash))
    }
}

/// An in-memory mirror of the Postgres schema, enforcing the same
/// idempotence contract (duplicate block insert is a no-op, duplicate
/// receipt update is a no-op) the real [`chain_indexer::store::PgStore`] does.
#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<FakeStoreInner>,
}

#[derive(Default)]
struct FakeStoreInner {
    blocks: HashMap<String, Block>,
    transactions: HashMap<String, Transaction>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn count_block_by_hash(&self, hash: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.blocks.contains_key(hash))
    }

    async fn insert_block_with_transactions(
        &self,
        block: &Block,
        transactions: &[Transaction],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.blocks.contains_key(&block.hash) {
            return Ok(());
        }
        inner.blocks.insert(block.hash.clone(), block.clone());
        for tx in transactions {
            inner.transactions.insert(tx.hash.clone(), tx.clone());
        }
        Ok(())
    }

    async fn update_transaction_receipt(
        &self,
        tx_hash: &str,
        logs: &[TransactionLog],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(tx) = inner.transactions.get_mut(tx_hash) else {
            return Err(StoreError::NotFound);
        };
        if tx.receipt_ready {
            return Ok(());
        }
        tx.logs = logs.to_vec();
        tx.receipt_ready = true;
        Ok(())
    }

    async fn list_pending_receipt_hashes(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .transactions
            .values()
            .filter(|t| !t.receipt_ready)
            .map(|t| t.hash.clone())
            .collect())
    }

    async fn list_known_block_numbers(&self) -> Result<Vec<u64>, StoreError> {
        let inner = self.inner.lock().await;
        let set: HashSet<u64> = inner.blocks.values().map(|b| b.number).collect();
        Ok(set.into_iter().collect())
    }

    async fn latest_block_number(&self) -> Result<Option<u64>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.blocks.values().map(|b| b.number).max())
    }

    async fn oldest_block_number(&self) -> Result<Option<u64>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.blocks.values().map(|b| b.number).min())
    }

    async fn recent_blocks(&self, limit: u32) -> Result<Vec<BlockSummary>, StoreError> {
        let inner = self.inner.lock().await;
        let mut blocks: Vec<&Block> = inner.blocks.values().collect();
        blocks.sort_by(|a, b| b.number.cmp(&a.number));
        blocks.truncate(limit as usize);
        Ok(blocks
            .into_iter()
            .map(|b| BlockSummary {
                block: b.clone(),
                transactions: transactions_for(&inner.transactions, &b.hash),
            })
            .collect())
    }

    async fn block_by_id(&self, id: &BlockId) -> Result<Option<BlockSummary>, StoreError> {
        let inner = self.inner.lock().await;
        let block = match id {
            BlockId::Number(number) => inner.blocks.values().find(|b| b.number == *number),
            BlockId::Hash(hash) => inner.blocks.get(hash),
        };
        Ok(block.map(|b| BlockSummary {
            block: b.clone(),
            transactions: transactions_for(&inner.transactions, &b.hash),
        }))
    }

    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<Transaction>, StoreError> {
        Ok(self.inner.lock().await.transactions.get(hash).cloned())
    }

    async fn block_count(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().await.blocks.len() as u64)
    }

    async fn transaction_count(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().await.transactions.len() as u64)
    }

    async fn pending_receipt_count(&self) -> Result<u64, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .transactions
            .values()
            .filter(|t| !t.receipt_ready)
            .count() as u64)
    }
}

fn transactions_for(transactions: &HashMap<String, Transaction>, block_hash: &str) -> Vec<String> {
    transactions
        .values()
        .filter(|t| t.ref_block_hash == block_hash)
        .map(|t| t.hash.clone())
        .collect()
}

/// An in-memory mirror of the ready/unacked/rejected three-list protocol the
/// real [`chain_indexer::queue::RedisTaskQueue`] implements over Redis.
#[derive(Default)]
pub struct FakeTaskQueue {
    inner: Mutex<HashMap<String, FakeQueueLists>>,
}

#[derive(Default)]
struct FakeQueueLists {
    ready: VecDeque<String>,
    unacked: Vec<String>,
    rejected: VecDeque<String>,
}

impl FakeTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ready_len(&self, queue: &str) -> usize {
        self.inner
            .lock()
            .await
            .get(queue)
            .map(|l| l.ready.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl TaskQueue for FakeTaskQueue {
    async fn publish(&self, queue: &str, task: &Task) -> Result<(), QueueError> {
        let payload = serde_json::to_string(task)
            .map_err(|e| QueueError::Delivery(e.to_string()))?;
        let mut inner = self.inner.lock().await;
        inner.entry(queue.to_string()).or_default().ready.push_back(payload);
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Option<Delivery>, QueueError> {
        let mut inner = self.inner.lock().await;
        let lists = inner.entry(queue.to_string()).or_default();
        let Some(raw_payload) = lists.ready.pop_front() else {
            return Ok(None);
        };
        lists.unacked.push(raw_payload.clone());
        Ok(Some(Delivery { raw_payload }))
    }

    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        let lists = inner.entry(queue.to_string()).or_default();
        if let Some(pos) = lists.unacked.iter().position(|p| p == &delivery.raw_payload) {
            lists.unacked.remove(pos);
        }
        Ok(())
    }

    async fn reject(&self, queue: &str, delivery: &Delivery) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        let lists = inner.entry(queue.to_string()).or_default();
        if let Some(pos) = lists.unacked.iter().position(|p| p == &delivery.raw_payload) {
            lists.unacked.remove(pos);
        }
        lists.rejected.push_back(delivery.raw_payload.clone());
        Ok(())
    }

    async fn requeue_rejected(&self, queue: &str, limit: u32) -> Result<u64, QueueError> {
        let mut inner = self.inner.lock().await;
        let lists = inner.entry(queue.to_string()).or_default();
        let mut moved = 0u64;
        for _ in 0..limit {
            match lists.rejected.pop_front() {
                Some(payload) => {
                    lists.ready.push_back(payload);
                    moved += 1;
                }
                None => break,
            }
        }
        Ok(moved)
    }

    async fn stats(&self, queue: &str) -> Result<QueueStats, QueueError> {
        let inner = self.inner.lock().await;
        let lists = inner.get(queue);
        Ok(QueueStats {
            ready: lists.map(|l| l.ready.len()).unwrap_or(0) as u64,
            unacked: lists.map(|l| l.unacked.len()).unwrap_or(0) as u64,
            rejected: lists.map(|l| l.rejected.len()).unwrap_or(0) as u64,
        })
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

/// Drains every `IndexBlock` task currently on the `blocks` queue through a
/// [`BlockWorkerPool`]'s real per-task logic, and every `FetchReceipt` task
/// through a [`ReceiptWorkerPool`]'s, until both are empty. Runs `process`
/// directly rather than spinning up the pools' background consumer loops,
/// since a test only needs the processing applied once per enqueued task.
pub async fn drain_all(
    store: &Arc<FakeStore>,
    chain: &Arc<FakeChainClient>,
    queue: &Arc<FakeTaskQueue>,
    block_queue: &str,
    receipt_queue: &str,
) {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let block_pool = BlockWorkerPool::new(
        Arc::clone(store) as Arc<dyn Store>,
        Arc::clone(chain) as Arc<dyn ChainClient>,
        Arc::clone(queue) as Arc<dyn TaskQueue>,
        block_queue.to_string(),
        receipt_queue.to_string(),
        1,
        shutdown_rx.clone(),
    );
    let receipt_pool = ReceiptWorkerPool::new(
        Arc::clone(store) as Arc<dyn Store>,
        Arc::clone(chain) as Arc<dyn ChainClient>,
        Arc::clone(queue) as Arc<dyn TaskQueue>,
        receipt_queue.to_string(),
        1,
        shutdown_rx,
    );

    loop {
        let mut progressed = false;

        while let Some(delivery) = queue.consume(block_queue).await.unwrap() {
            progressed = true;
            match block_pool.process(&delivery.raw_payload).await {
                Ok(()) => queue.ack(block_queue, &delivery).await.unwrap(),
                Err(_) => queue.reject(block_queue, &delivery).await.unwrap(),
            }
        }

        while let Some(delivery) = queue.consume(receipt_queue).await.unwrap() {
            progressed = true;
            match receipt_pool.process(&delivery.raw_payload).await {
                Ok(()) => queue.ack(receipt_queue, &delivery).await.unwrap(),
                Err(_) => queue.reject(receipt_queue, &delivery).await.unwrap(),
            }
        }

        if !progressed {
            break;
        }
    }
}
