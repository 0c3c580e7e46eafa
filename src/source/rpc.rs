//! JSON-RPC block source
//!
//! Fetches raw block documents in `jsonParsed` encoding via the standard
//! `getSlot` / `getBlock` methods. A skipped or pruned slot maps to
//! `Ok(None)`, everything else transient maps to [`SourceError`].

use crate::error::SourceError;
use crate::source::{BlockSource, RawBlock};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

// Slot skipped / not available in long-term storage. Not an error: the
// poller advances past these.
const SLOT_SKIPPED_CODES: [i64; 2] = [-32007, -32009];

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

pub struct RpcBlockSource {
    client: reqwest::Client,
    url: String,
}

impl RpcBlockSource {
    pub fn new(url: impl Into<String>) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<RpcResponse<T>, SourceError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self.client.post(&self.url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(SourceError::Status(response.status().as_u16()));
        }

        let decoded = response.json::<RpcResponse<T>>().await?;
        Ok(decoded)
    }
}

#[async_trait]
impl BlockSource for RpcBlockSource {
    async fn fetch_block(&self, slot: u64) -> Result<Option<RawBlock>, SourceError> {
        let params = json!([
            slot,
            {
                "encoding": "jsonParsed",
                "maxSupportedTransactionVersion": 0,
                "transactionDetails": "full",
                "rewards": false,
            }
        ]);

        let response: RpcResponse<RawBlock> = self.call("getBlock", params).await?;

        if let Some(err) = response.error {
            if SLOT_SKIPPED_CODES.contains(&err.code) {
                log::debug!("Slot {} skipped by the cluster ({})", slot, err.message);
                return Ok(None);
            }
            return Err(SourceError::Decode(format!(
                "rpc error {}: {}",
                err.code, err.message
            )));
        }

        Ok(response.result)
    }

    async fn latest_slot(&self) -> Result<u64, SourceError> {
        let response: RpcResponse<u64> = self.call("getSlot", json!([])).await?;

        if let Some(err) = response.error {
            return Err(SourceError::Decode(format!(
                "rpc error {}: {}",
                err.code, err.message
            )));
        }

        response
            .result
            .ok_or_else(|| SourceError::Decode("getSlot returned no result".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_response_decoding() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{"blockTime":1700000000,"blockHeight":250000000,"transactions":[]}}"#;
        let response: RpcResponse<RawBlock> = serde_json::from_str(body).unwrap();
        let block = response.result.unwrap();
        assert_eq!(block.block_time, Some(1_700_000_000));
        assert!(block.transactions.is_empty());
    }

    #[test]
    fn test_rpc_error_body_decoding() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32007,"message":"Slot 123 was skipped"}}"#;
        let response: RpcResponse<RawBlock> = serde_json::from_str(body).unwrap();
        let err = response.error.unwrap();
        assert!(SLOT_SKIPPED_CODES.contains(&err.code));
        assert!(response.result.is_none());
    }
}
