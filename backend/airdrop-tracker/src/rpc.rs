//! Ethereum JSON-RPC client for the airdrop contract.
//!
//! ## Resilience
//!
//! * Read calls (`eth_call`, `eth_getTransactionReceipt`) back off exponentially
//!   on transport errors and rate limiting, up to [`MAX_READ_ATTEMPTS`] tries.
//! * `eth_sendTransaction` is attempted once. A lost response may still mean
//!   the transaction was broadcast, so resending is left to the operator.
//! * JSON-RPC error objects are never retried; for a send they are a rejection.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::abi::{self, Uint256};
use crate::entry::Address;
use crate::errors::{Result, TrackerError};

const MAX_BACKOFF_SECS: u64 = 30;
const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_READ_ATTEMPTS: u32 = 5;

/// Hash of a submitted transaction, `0x`-prefixed hex.
pub type TxHash = String;

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// The fields of a transaction receipt the tracker needs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct Receipt {
    pub transaction_hash: Option<String>,
    pub block_number: Option<String>,
    /// `0x1` on success, `0x0` on revert. Pre-Byzantium receipts omit it.
    pub status: Option<String>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        matches!(self.status.as_deref(), Some("0x1") | Some("0x01"))
    }
}

// ─────────────────────────────────────────────────────────
// Chain seam
// ─────────────────────────────────────────────────────────

/// What the tracker and preflight checks need from the chain.
#[async_trait]
pub trait AirdropChain: Send + Sync {
    /// Send one `airdropMultipleWithPredefinedToken` transaction.
    async fn submit(&self, addresses: &[Address], amounts: &[u128]) -> Result<TxHash>;

    /// `None` while the transaction is not yet mined.
    async fn receipt(&self, tx_hash: &str) -> Result<Option<Receipt>>;

    async fn owner(&self) -> Result<Address>;

    async fn airdrop_balance(&self) -> Result<Uint256>;
}

/// [`AirdropChain`] over HTTP JSON-RPC. Transactions are signed by the node
/// for the unlocked operator account.
pub struct EthRpc {
    client: Client,
    rpc_url: String,
    contract: Address,
    operator: Address,
}

impl EthRpc {
    pub fn new(client: Client, rpc_url: String, contract: Address, operator: Address) -> Self {
        Self {
            client,
            rpc_url,
            contract,
            operator,
        }
    }

    async fn call_contract(&self, calldata: Vec<u8>) -> Result<Vec<u8>> {
        let params = json!([
            {
                "to": self.contract.to_string(),
                "data": format!("0x{}", hex::encode(calldata)),
            },
            "latest"
        ]);
        let raw: Option<String> = self.read("eth_call", params).await?;
        let raw = raw.ok_or_else(|| TrackerError::RpcDecode("eth_call returned null".into()))?;
        abi::decode_hex(&raw)
    }

    /// A read request: retried with back-off on transport failures.
    async fn read<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>> {
        let mut backoff = INITIAL_BACKOFF_SECS;
        let mut attempt = 1;

        loop {
            match self.send_once(method, &params).await {
                Err(TrackerError::Http(e)) if attempt < MAX_READ_ATTEMPTS => {
                    warn!("{method} failed (attempt {attempt}, retry in {backoff}s): {e}");
                }
                other => return other,
            }
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
            attempt += 1;
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &Value,
    ) -> Result<Option<T>> {
        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: RpcResponse<T> = resp.json().await?;
        if let Some(err) = body.error {
            return Err(TrackerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        debug!("{method} ok");
        Ok(body.result)
    }
}

#[async_trait]
impl AirdropChain for EthRpc {
    async fn submit(&self, addresses: &[Address], amounts: &[u128]) -> Result<TxHash> {
        let calldata = abi::encode_airdrop_multiple(addresses, amounts);
        let params = json!([{
            "from": self.operator.to_string(),
            "to": self.contract.to_string(),
            "data": format!("0x{}", hex::encode(calldata)),
        }]);
        let hash: Option<TxHash> = self.send_once("eth_sendTransaction", &params).await?;
        hash.ok_or_else(|| TrackerError::RpcDecode("eth_sendTransaction returned null".into()))
    }

    async fn receipt(&self, tx_hash: &str) -> Result<Option<Receipt>> {
        self.read("eth_getTransactionReceipt", json!([tx_hash]))
            .await
    }

    async fn owner(&self) -> Result<Address> {
        let data = self
            .call_contract(abi::encode_no_args(abi::OWNER_SELECTOR))
            .await?;
        abi::decode_address(&data)
    }

    async fn airdrop_balance(&self) -> Result<Uint256> {
        let data = self
            .call_contract(abi::encode_no_args(
                abi::BALANCE_OF_PREDEFINED_TOKEN_SELECTOR,
            ))
            .await?;
        abi::decode_uint256(&data)
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_status_flags() {
        let ok: Receipt = serde_json::from_value(json!({
            "transactionHash": "0xabc",
            "blockNumber": "0x10",
            "status": "0x1"
        }))
        .unwrap();
        assert!(ok.succeeded());

        let reverted: Receipt = serde_json::from_value(json!({ "status": "0x0" })).unwrap();
        assert!(!reverted.succeeded());

        let legacy: Receipt = serde_json::from_value(json!({ "blockNumber": "0x1" })).unwrap();
        assert!(!legacy.succeeded());
    }

    #[test]
    fn null_receipt_result_is_none() {
        let body: RpcResponse<Receipt> =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 1, "result": null }))
                .unwrap();
        assert!(body.result.is_none());
        assert!(body.error.is_none());
    }

    #[test]
    fn error_object_is_parsed() {
        let body: RpcResponse<String> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "insufficient funds" }
        }))
        .unwrap();
        let err = body.error.unwrap();
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "insufficient funds");
    }
}
