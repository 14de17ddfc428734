//! The Chain Client: a thin, timeout-bounded contract over a JSON-RPC chain
//! node. The real implementation talks to `eth_*` methods directly via the
//! low-level `alloy-rpc-client` transport rather than the higher-level
//! `Provider` trait, because sender recovery needs the transaction's raw
//! `v`/`r`/`s` fields, not an address the node already recovered for us.

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, TxHash, B256, U256};
use alloy_rpc_client::{ClientBuilder, RpcClient};
use async_trait::async_trait;
use serde_json::Value;

use crate::chain::signer::RawSignature;
use crate::chain::types::{ChainBlock, ChainHeader, ChainLog, ChainReceipt, ChainTransaction};
use crate::error::ChainClientError;

/// Bounded deadline applied to every RPC call.
pub const RPC_CALL_DEADLINE: Duration = Duration::from_secs(3);

/// Contract over a JSON-RPC chain node. Exists as a trait so the coordinator
/// and worker pools can be tested against an in-memory fake instead of a
/// live node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The chain's current head block number (`eth_blockNumber`).
    async fn head_number(&self) -> Result<u64, ChainClientError>;

    /// Fetches a full block with transactions (`eth_getBlockByNumber`, full
    /// tx objects). Returns `Err(BlockNotFound)` if the node has no such
    /// block yet.
    async fn block_by_number(&self, number: u64) -> Result<ChainBlock, ChainClientError>;

    /// Fetches only the header at `number` (`eth_getBlockByNumber`, tx
    /// hashes only), used by the coordinator's tip-follow loop, which only
    /// needs `parent_hash`.
    async fn header_by_number(&self, number: u64) -> Result<ChainHeader, ChainClientError>;

    /// Fetches a transaction's receipt (`eth_getTransactionReceipt`).
    async fn transaction_receipt(&self, hash: TxHash) -> Result<ChainReceipt, ChainClientError>;
}

/// JSON-RPC-backed [`ChainClient`] over HTTP.
pub struct JsonRpcChainClient {
    client: RpcClient,
}

impl JsonRpcChainClient {
    pub fn new(rpc_url: &str) -> Result<Self, ChainClientError> {
        let url = rpc_url
            .parse()
            .map_err(|e| ChainClientError::Transport(format!("invalid RPC_URL: {e}")))?;
        let client = ClientBuilder::default().http(url);
        Ok(Self { client })
    }

    async fn call<P: serde::Serialize + Send + Sync, T: serde::de::DeserializeOwned>(
        &self,
        method: &'static str,
        params: P,
    ) -> Result<T, ChainClientError> {
        tokio::time::timeout(RPC_CALL_DEADLINE, self.client.request(method, params))
            .await
            .map_err(|_| ChainClientError::Timeout)?
            .map_err(|e| ChainClientError::Transport(e.to_string()))
    }
}

fn block_tag(number: u64) -> String {
    format!("0x{number:x}")
}

fn field<'a>(v: &'a Value, name: &str) -> Result<&'a Value, ChainClientError> {
    v.get(name)
        .ok_or_else(|| ChainClientError::Decode(format!("missing field `{name}`")))
}

fn as_hex_str<'a>(v: &'a Value, name: &str) -> Result<&'a str, ChainClientError> {
    field(v, name)?
        .as_str()
        .ok_or_else(|| ChainClientError::Decode(format!("field `{name}` is not a string")))
}

fn parse_u64(v: &Value, name: &str) -> Result<u64, ChainClientError> {
    let s = as_hex_str(v, name)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| ChainClientError::Decode(format!("field `{name}`: {e}")))
}

fn parse_u128(v: &Value, name: &str) -> Result<u128, ChainClientError> {
    let s = as_hex_str(v, name)?;
    u128::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| ChainClientError::Decode(format!("field `{name}`: {e}")))
}

fn parse_b256(v: &Value, name: &str) -> Result<B256, ChainClientError> {
    let s = as_hex_str(v, name)?;
    B256::from_str(s).map_err(|e| ChainClientError::Decode(format!("field `{name}`: {e}")))
}

fn parse_address(v: &Value, name: &str) -> Result<Address, ChainClientError> {
    let s = as_hex_str(v, name)?;
    Address::from_str(s).map_err(|e| ChainClientError::Decode(format!("field `{name}`: {e}")))
}

fn parse_optional_address(v: &Value, name: &str) -> Result<Option<Address>, ChainClientError> {
    match v.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => parse_address(v, name).map(Some),
    }
}

fn parse_u256(v: &Value, name: &str) -> Result<U256, ChainClientError> {
    let s = as_hex_str(v, name)?;
    U256::from_str(s).map_err(|e| ChainClientError::Decode(format!("field `{name}`: {e}")))
}

fn parse_bytes(v: &Value, name: &str) -> Result<Bytes, ChainClientError> {
    let s = as_hex_str(v, name)?;
    Bytes::from_str(s).map_err(|e| ChainClientError::Decode(format!("field `{name}`: {e}")))
}

fn parse_transaction(v: &Value) -> Result<ChainTransaction, ChainClientError> {
    let chain_id = match v.get("chainId") {
        None | Some(Value::Null) => None,
        Some(_) => Some(parse_u64(v, "chainId")?),
    };

    Ok(ChainTransaction {
        hash: parse_b256(v, "hash")?,
        nonce: parse_u64(v, "nonce")?,
        to: parse_optional_address(v, "to")?,
        value: parse_u256(v, "value")?,
        input: parse_bytes(v, "input")?,
        gas_price: parse_u128(v, "gasPrice")?,
        gas_limit: parse_u64(v, "gas")?,
        chain_id,
        signature: RawSignature {
            v: parse_u64(v, "v")?,
            r: parse_u256(v, "r")?,
            s: parse_u256(v, "s")?,
        },
    })
}

fn parse_block(v: &Value) -> Result<ChainBlock, ChainClientError> {
    let transactions = field(v, "transactions")?
        .as_array()
        .ok_or_else(|| ChainClientError::Decode("`transactions` is not an array".into()))?
        .iter()
        .map(parse_transaction)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ChainBlock {
        number: parse_u64(v, "number")?,
        hash: parse_b256(v, "hash")?,
        parent_hash: parse_b256(v, "parentHash")?,
        timestamp: parse_u64(v, "timestamp")?,
        transactions,
    })
}

fn parse_header(v: &Value) -> Result<ChainHeader, ChainClientError> {
    Ok(ChainHeader {
        number: parse_u64(v, "number")?,
        hash: parse_b256(v, "hash")?,
        parent_hash: parse_b256(v, "parentHash")?,
    })
}

fn parse_log(v: &Value) -> Result<ChainLog, ChainClientError> {
    let topics = field(v, "topics")?
        .as_array()
        .ok_or_else(|| ChainClientError::Decode("`topics` is not an array".into()))?
        .iter()
        .map(|t| {
            t.as_str()
                .ok_or_else(|| ChainClientError::Decode("topic is not a string".into()))
                .and_then(|s| {
                    B256::from_str(s).map_err(|e| ChainClientError::Decode(e.to_string()))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let log_index = match v.get("logIndex") {
        None | Some(Value::Null) => None,
        Some(_) => Some(parse_u64(v, "logIndex")?),
    };

    Ok(ChainLog {
        address: parse_address(v, "address")?,
        topics,
        data: parse_bytes(v, "data")?,
        log_index,
    })
}

fn parse_receipt(v: &Value) -> Result<ChainReceipt, ChainClientError> {
    let logs = field(v, "logs")?
        .as_array()
        .ok_or_else(|| ChainClientError::Decode("`logs` is not an array".into()))?
        .iter()
        .map(parse_log)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ChainReceipt {
        transaction_hash: parse_b256(v, "transactionHash")?,
        logs,
    })
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    async fn head_number(&self) -> Result<u64, ChainClientError> {
        let hex: String = self.call("eth_blockNumber", ()).await?;
        u64::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|e| ChainClientError::Decode(e.to_string()))
    }

    async fn block_by_number(&self, number: u64) -> Result<ChainBlock, ChainClientError> {
        let value: Value = self
            .call("eth_getBlockByNumber", (block_tag(number), true))
            .await?;
        if value.is_null() {
            return Err(ChainClientError::BlockNotFound(number));
        }
        parse_block(&value)
    }

    async fn header_by_number(&self, number: u64) -> Result<ChainHeader, ChainClientError> {
        let value: Value = self
            .call("eth_getBlockByNumber", (block_tag(number), false))
            .await?;
        if value.is_null() {
            return Err(ChainClientError::HeaderNotFound(number));
        }
        parse_header(&value)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<ChainReceipt, ChainClientError> {
        let value: Value = self
            .call("eth_getTransactionReceipt", (hash,))
            .await?;
        if value.is_null() {
            return Err(ChainClientError::ReceiptNotFound(hash));
        }
        parse_receipt(&value)
    }
}
