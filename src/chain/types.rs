//! Chain-node-facing shapes: a reduced projection of `eth_getBlockByNumber`,
//! `eth_getBlockByNumber` (header only), and `eth_getTransactionReceipt`
//! responses, carrying exactly the fields the ingestion pipeline needs.

use alloy_primitives::{Address, Bytes, TxHash, B256, U256};

use crate::chain::signer::{RawSignature, UnsignedLegacyTx};

/// A block header, used by the coordinator's tip-follow loop (it only needs
/// `number` and `parent_hash`).
#[derive(Debug, Clone)]
pub struct ChainHeader {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
}

/// A full block with its transactions, as returned by `blockByNumber`.
#[derive(Debug, Clone)]
pub struct ChainBlock {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub transactions: Vec<ChainTransaction>,
}

/// A single transaction inside a fetched block, carrying both its already-
/// decoded fields and the raw signature material needed for sender recovery.
#[derive(Debug, Clone)]
pub struct ChainTransaction {
    pub hash: TxHash,
    pub nonce: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub chain_id: Option<u64>,
    pub signature: RawSignature,
}

impl ChainTransaction {
    pub fn unsigned(&self) -> UnsignedLegacyTx {
        UnsignedLegacyTx {
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: self.to,
            value: self.value,
            input: self.input.clone(),
        }
    }
}

/// A transaction receipt, as returned by `transactionReceipt`.
#[derive(Debug, Clone)]
pub struct ChainReceipt {
    pub transaction_hash: TxHash,
    pub logs: Vec<ChainLog>,
}

/// A single event log inside a receipt.
#[derive(Debug, Clone)]
pub struct ChainLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub log_index: Option<u64>,
}
