use alloy_primitives::{Address, Bytes, TxHash, B256, U256};
use serde::{Deserialize, Serialize};

/// A single event log entry from a transaction receipt.
///
/// Stored as part of the `logs` JSON document on the transaction row; this is
/// a reduced projection of the full RPC log (address + topics + data), which
/// is all the HTTP surface and the data model need to expose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub log_index: Option<u64>,
}

/// An included transaction, as recorded in the `transaction` table.
///
/// Created by a block worker with `receipt_ready = false` and empty `logs`;
/// mutated exactly once by a receipt worker. `value` is kept as a decimal
/// string because transaction values can exceed `u64::MAX`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub ref_block_hash: String,
    pub from: String,
    pub to: Option<String>,
    pub nonce: u64,
    pub data: String,
    pub value: String,
    pub logs: Vec<TransactionLog>,
    pub receipt_ready: bool,
}

impl Transaction {
    /// Builds the row inserted by the block worker, before receipt arrival:
    /// `receipt_ready = false`, `logs` empty.
    pub fn new_pending(
        hash: TxHash,
        ref_block_hash: B256,
        from: Address,
        to: Option<Address>,
        nonce: u64,
        data: &Bytes,
        value: U256,
    ) -> Self {
        Self {
            hash: hash.to_string(),
            ref_block_hash: ref_block_hash.to_string(),
            from: from.to_string(),
            to: to.map(|a| a.to_string()),
            nonce,
            data: alloy_primitives::hex::encode(data),
            value: value.to_string(),
            logs: Vec::new(),
            receipt_ready: false,
        }
    }
}
