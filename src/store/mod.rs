mod postgres;

pub use postgres::PgStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{Block, BlockSummary, Transaction, TransactionLog};

/// Lookup key for `GET /blocks/:id`: either a block number or a block hash.
#[derive(Debug, Clone)]
pub enum BlockId {
    Number(u64),
    Hash(String),
}

/// The relational store. Every write is idempotent: inserting a block that
/// already exists, or updating a receipt that's already filled in, must be
/// safe to retry without corrupting state; the queue's at-least-once
/// delivery depends on it.
#[async_trait]
pub trait Store: Send + Sync {
    /// `true` if a block with this hash is already recorded. Used by the
    /// block worker to skip re-insertion on a requeued or duplicate task.
    async fn count_block_by_hash(&self, hash: &str) -> Result<bool, StoreError>;

    /// Inserts a block and all of its transactions atomically. Must be a
    /// no-op (not an error) if the block hash already exists.
    async fn insert_block_with_transactions(
        &self,
        block: &Block,
        transactions: &[Transaction],
    ) -> Result<(), StoreError>;

    /// Fills in a transaction's logs and flips `receipt_ready`. A no-op if
    /// the transaction is already marked ready (idempotent at the row
    /// level).
    async fn update_transaction_receipt(
        &self,
        tx_hash: &str,
        logs: &[TransactionLog],
    ) -> Result<(), StoreError>;

    /// Transaction hashes still awaiting a receipt, used to resume receipt
    /// fetching after a restart.
    async fn list_pending_receipt_hashes(&self) -> Result<Vec<String>, StoreError>;

    /// All distinct block numbers currently recorded, used by the
    /// coordinator to compute startup gaps.
    async fn list_known_block_numbers(&self) -> Result<Vec<u64>, StoreError>;

    /// Highest recorded block number, if any.
    async fn latest_block_number(&self) -> Result<Option<u64>, StoreError>;

    /// Lowest recorded block number, if any.
    async fn oldest_block_number(&self) -> Result<Option<u64>, StoreError>;

    /// The `limit` most recent blocks, newest first, each with its
    /// transaction hashes. Backs `GET /blocks?limit=`.
    async fn recent_blocks(&self, limit: u32) -> Result<Vec<BlockSummary>, StoreError>;

    /// A single block by number or hash, with its transaction hashes.
    /// Backs `GET /blocks/:id`.
    async fn block_by_id(&self, id: &BlockId) -> Result<Option<BlockSummary>, StoreError>;

    /// A single transaction by hash. Backs `GET /transaction/:txHash`.
    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<Transaction>, StoreError>;

    /// Total recorded blocks, for the telemetry loop.
    async fn block_count(&self) -> Result<u64, StoreError>;

    /// Total recorded transactions, for the telemetry loop.
    async fn transaction_count(&self) -> Result<u64, StoreError>;

    /// Transactions still awaiting a receipt, for the telemetry loop.
    async fn pending_receipt_count(&self) -> Result<u64, StoreError>;
}
