pub mod client;
pub mod signer;
pub mod types;

pub use client::{ChainClient, JsonRpcChainClient, RPC_CALL_DEADLINE};
pub use signer::{recover_sender, RawSignature, UnsignedLegacyTx};
pub use types::{ChainBlock, ChainHeader, ChainLog, ChainReceipt, ChainTransaction};
