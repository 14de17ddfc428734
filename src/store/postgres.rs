use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::error::StoreError;
use crate::model::{Block, BlockSummary, Transaction, TransactionLog};
use crate::store::{BlockId, Store};

/// Backoff schedule around the initial pool connection, matching the
/// original service's `jpillora/backoff` settings (factor 1.5, 1s..32s).
const BACKOFF_MIN: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(32);
const BACKOFF_FACTOR: f64 = 1.5;

/// Rows are committed to Postgres in batches of this size when a block
/// carries an unusually large transaction set.
const INSERT_BATCH_SIZE: usize = 100;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects with retry, then runs embedded migrations. Each failed
    /// attempt backs off by `BACKOFF_FACTOR`, clamped to `BACKOFF_MAX`.
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let mut delay = BACKOFF_MIN;
        let pool = loop {
            match PgPoolOptions::new().max_connections(20).connect(dsn).await {
                Ok(pool) => break pool,
                Err(err) => {
                    tracing::warn!(error = %err, retry_in = ?delay, "database connection failed, retrying");
                    tokio::time::sleep(delay).await;
                    let next = delay.mul_f64(BACKOFF_FACTOR);
                    delay = next.min(BACKOFF_MAX);
                }
            }
        };

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn block_from_row(row: &sqlx::postgres::PgRow) -> Result<Block, StoreError> {
    Ok(Block {
        hash: row.try_get("hash")?,
        number: row.try_get::<i64, _>("number")? as u64,
        timestamp: row.try_get::<i64, _>("timestamp")? as u64,
        parent_hash: row.try_get("parent_hash")?,
    })
}

fn transaction_from_row(row: &sqlx::postgres::PgRow) -> Result<Transaction, StoreError> {
    let logs_json: serde_json::Value = row.try_get("logs")?;
    let logs: Vec<TransactionLog> = serde_json::from_value(logs_json)
        .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;

    Ok(Transaction {
        hash: row.try_get("hash")?,
        ref_block_hash: row.try_get("ref_block_hash")?,
        from: row.try_get("from")?,
        to: row.try_get("to")?,
        nonce: row.try_get::<i64, _>("nonce")? as u64,
        data: row.try_get("data")?,
        value: row.try_get("value")?,
        logs,
        receipt_ready: row.try_get("receipt_ready")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn count_block_by_hash(&self, hash: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM block WHERE hash = $1")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert_block_with_transactions(
        &self,
        block: &Block,
        transactions: &[Transaction],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO block (hash, number, timestamp, parent_hash)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (hash) DO NOTHING",
        )
        .bind(&block.hash)
        .bind(block.number as i64)
        .bind(block.timestamp as i64)
        .bind(&block.parent_hash)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            // Block already recorded; a requeued or duplicate task. The
            // transaction insert below is still safe to skip: if the block
            // exists, so do its transactions (both are written atomically).
            tx.commit().await?;
            return Ok(());
        }

        for batch in transactions.chunks(INSERT_BATCH_SIZE) {
            for t in batch {
                let logs_json = serde_json::to_value(&t.logs)
                    .map_err(|e| StoreError::Database(sqlx::Error::Encode(Box::new(e))))?;

                sqlx::query(
                    "INSERT INTO transaction
                        (hash, ref_block_hash, \"from\", \"to\", nonce, data, value, logs, receipt_ready)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                     ON CONFLICT (hash) DO NOTHING",
                )
                .bind(&t.hash)
                .bind(&t.ref_block_hash)
                .bind(&t.from)
                .bind(&t.to)
                .bind(t.nonce as i64)
                .bind(&t.data)
                .bind(&t.value)
                .bind(logs_json)
                .bind(t.receipt_ready)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_transaction_receipt(
        &self,
        tx_hash: &str,
        logs: &[TransactionLog],
    ) -> Result<(), StoreError> {
        let logs_json = serde_json::to_value(logs)
            .map_err(|e| StoreError::Database(sqlx::Error::Encode(Box::new(e))))?;

        let result = sqlx::query(
            "UPDATE transaction SET logs = $1, receipt_ready = TRUE
             WHERE hash = $2 AND NOT receipt_ready",
        )
        .bind(logs_json)
        .bind(tx_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // No row changed: either the transaction is already marked ready
        // (idempotent no-op), or the row doesn't exist yet because the
        // owning block hasn't committed (a retryable miss, the caller
        // should reject and let the requeue loop try again).
        let exists = sqlx::query("SELECT 1 FROM transaction WHERE hash = $1")
            .bind(tx_hash)
            .fetch_optional(&self.pool)
            .await?
            .is_some();

        if exists {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn list_pending_receipt_hashes(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT hash FROM transaction WHERE NOT receipt_ready")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|r| r.try_get("hash").map_err(StoreError::from)).collect()
    }

    async fn list_known_block_numbers(&self) -> Result<Vec<u64>, StoreError> {
        let rows = sqlx::query("SELECT DISTINCT number FROM block ORDER BY number")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| r.try_get::<i64, _>("number").map(|n| n as u64).map_err(StoreError::from))
            .collect()
    }

    async fn latest_block_number(&self) -> Result<Option<u64>, StoreError> {
        let row = sqlx::query("SELECT MAX(number) AS max FROM block")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<Option<i64>, _>("max")?.map(|n| n as u64))
    }

    async fn oldest_block_number(&self) -> Result<Option<u64>, StoreError> {
        let row = sqlx::query("SELECT MIN(number) AS min FROM block")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<Option<i64>, _>("min")?.map(|n| n as u64))
    }

    async fn recent_blocks(&self, limit: u32) -> Result<Vec<BlockSummary>, StoreError> {
        let rows = sqlx::query("SELECT * FROM block ORDER BY number DESC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let block = block_from_row(row)?;
            let transactions = self.transaction_hashes_for_block(&block.hash).await?;
            summaries.push(BlockSummary { block, transactions });
        }
        Ok(summaries)
    }

    async fn block_by_id(&self, id: &BlockId) -> Result<Option<BlockSummary>, StoreError> {
        let row = match id {
            BlockId::Number(number) => {
                sqlx::query("SELECT * FROM block WHERE number = $1 ORDER BY hash LIMIT 1")
                    .bind(*number as i64)
                    .fetch_optional(&self.pool)
                    .await?
            }
            BlockId::Hash(hash) => {
                sqlx::query("SELECT * FROM block WHERE hash = $1")
                    .bind(hash)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        let Some(row) = row else { return Ok(None) };
        let block = block_from_row(&row)?;
        let transactions = self.transaction_hashes_for_block(&block.hash).await?;
        Ok(Some(BlockSummary { block, transactions }))
    }

    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query("SELECT * FROM transaction WHERE hash = $1")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn block_count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM block")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("count")? as u64)
    }

    async fn transaction_count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM transaction")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("count")? as u64)
    }

    async fn pending_receipt_count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM transaction WHERE NOT receipt_ready")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("count")? as u64)
    }
}

impl PgStore {
    async fn transaction_hashes_for_block(&self, block_hash: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT hash FROM transaction WHERE ref_block_hash = $1")
            .bind(block_hash)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|r| r.try_get("hash").map_err(StoreError::from)).collect()
    }
}
