use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// A mined block as recorded in the `block` table.
///
/// `hash` is the primary key; `number` is indexed but not unique, so that a
/// best-effort reorg can leave two rows at the same height without
/// violating a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    pub number: u64,
    pub timestamp: u64,
    pub parent_hash: String,
}

impl Block {
    pub fn new(hash: B256, number: u64, timestamp: u64, parent_hash: B256) -> Self {
        Self {
            hash: hash.to_string(),
            number,
            timestamp,
            parent_hash: parent_hash.to_string(),
        }
    }
}

/// `Block` plus the hashes of its transactions, returned by `GET /blocks/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSummary {
    #[serde(flatten)]
    pub block: Block,
    pub transactions: Vec<String>,
}
