//! Crate-wide error types.
//!
//! Each subsystem gets its own `thiserror` enum so call sites can match on
//! specific failure modes; [`IndexerError`] composes them for code paths that
//! cross subsystem boundaries (the coordinator and worker pools).

use thiserror::Error;

/// Errors raised by the [`crate::chain::ChainClient`] implementations.
#[derive(Debug, Error)]
pub enum ChainClientError {
    #[error("rpc transport error: {0}")]
    Transport(String),

    #[error("rpc call exceeded deadline")]
    Timeout,

    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("header {0} not found")]
    HeaderNotFound(u64),

    #[error("receipt for {0} not found")]
    ReceiptNotFound(alloy_primitives::TxHash),

    #[error("malformed response from chain node: {0}")]
    Decode(String),
}

/// Errors raised by the [`crate::store::Store`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record not found, please revise your condition")]
    NotFound,

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Errors raised by the [`crate::queue::TaskQueue`] implementations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("broker delivery error: {0}")]
    Delivery(String),
}

/// Sender-recovery failure: neither signer scheme recovered a valid address.
#[derive(Debug, Error)]
#[error("failed to recover sender: eip155={eip155}, homestead={homestead}")]
pub struct SignerError {
    pub eip155: String,
    pub homestead: String,
}

/// Top-level error used by the coordinator and worker pools, where failures
/// from any subsystem must be classified into reject/fatal handling.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error(transparent)]
    Chain(#[from] ChainClientError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("malformed task payload: {0}")]
    MalformedPayload(String),
}

impl IndexerError {
    /// Whether this error is permanent (payload-level) rather than transient
    /// (upstream RPC/broker/DB). Permanent errors still result in a reject
    /// (there is no poison-pill guard), but workers log them louder than a
    /// transient failure.
    pub fn is_permanent(&self) -> bool {
        matches!(self, IndexerError::MalformedPayload(_) | IndexerError::Signer(_))
    }
}
