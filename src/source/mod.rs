//! Upstream source contracts and raw record schemas
//!
//! The pipeline depends only on the two narrow traits here. Raw shapes are
//! explicit serde structs with optional fields; field presence is validated
//! at the normalizer boundary, never by duck-typed JSON traversal.

pub mod graphql;
pub mod rpc;

use crate::error::SourceError;
use async_trait::async_trait;
use serde::Deserialize;

pub use graphql::GraphSource;
pub use rpc::RpcBlockSource;

/// Fixed page size for windowed queries; the skip cursor advances by this.
pub const PAGE_SIZE: usize = 1000;

/// Block-oriented source: given a slot, return the raw block document or
/// `None` when the slot does not exist (skipped slot).
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn fetch_block(&self, slot: u64) -> Result<Option<RawBlock>, SourceError>;

    /// The most recent slot the provider knows about, used to seed the cursor.
    async fn latest_slot(&self) -> Result<u64, SourceError>;
}

/// Windowed source: given a time window and a skip offset, return one page
/// of raw activity, ordered by ascending timestamp, at most [`PAGE_SIZE`]
/// records per collection.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(
        &self,
        start_ts: i64,
        end_ts: i64,
        skip: usize,
    ) -> Result<RawActivityPage, SourceError>;
}

/// A JSON number that upstreams encode either as a number or as a string.
///
/// Subgraphs emit big decimals as strings; permissive parsing accepts both
/// but missing values stay missing - they are never coerced to zero.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Num(f64),
    Text(String),
}

impl RawNumber {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawNumber::Num(n) => Some(*n),
            RawNumber::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RawNumber::Num(n) => Some(*n as i64),
            RawNumber::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|v| u64::try_from(v).ok())
    }
}

// ---------------------------------------------------------------------------
// GraphQL (subgraph) raw shapes
// ---------------------------------------------------------------------------

/// One page of the all-activity query: swaps, mints, burns and flash loans
/// plus the legacy transactions-with-embedded-swaps collection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawActivityPage {
    #[serde(default)]
    pub swaps: Vec<RawSwap>,
    #[serde(default)]
    pub mints: Vec<RawPoolEvent>,
    #[serde(default)]
    pub burns: Vec<RawPoolEvent>,
    #[serde(default, rename = "flashLoans")]
    pub flash_loans: Vec<RawFlashloan>,
    #[serde(default)]
    pub transactions: Vec<RawGraphTransaction>,
}

impl RawActivityPage {
    /// Total raw records across all collections in this page.
    pub fn record_count(&self) -> usize {
        self.swaps.len()
            + self.mints.len()
            + self.burns.len()
            + self.flash_loans.len()
            + self
                .transactions
                .iter()
                .map(|t| t.swaps.len())
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Largest single collection in this page. The pagination offset applies
    /// to each collection independently, so the cursor must advance by what
    /// was actually received, not the nominal page size; a short page
    /// otherwise leaps over records the indexer publishes late.
    pub fn max_collection_len(&self) -> usize {
        self.swaps
            .len()
            .max(self.mints.len())
            .max(self.burns.len())
            .max(self.flash_loans.len())
            .max(self.transactions.len())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawToken {
    pub id: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<RawNumber>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPoolContext {
    #[serde(rename = "token0Price")]
    pub token0_price: Option<RawNumber>,
    #[serde(rename = "token1Price")]
    pub token1_price: Option<RawNumber>,
    pub liquidity: Option<RawNumber>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSwap {
    pub id: Option<String>,
    pub timestamp: Option<RawNumber>,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<RawNumber>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub token0: Option<RawToken>,
    pub token1: Option<RawToken>,
    pub amount0: Option<RawNumber>,
    pub amount1: Option<RawNumber>,
    #[serde(rename = "amountUSD")]
    pub amount_usd: Option<RawNumber>,
    pub pool: Option<RawPoolContext>,
}

/// Pool with embedded token pair, as nested inside mint/burn records.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPool {
    pub id: Option<String>,
    pub token0: Option<RawToken>,
    pub token1: Option<RawToken>,
}

/// Shared raw shape of mint and burn records (identical upstream schema).
#[derive(Debug, Clone, Deserialize)]
pub struct RawPoolEvent {
    pub id: Option<String>,
    pub timestamp: Option<RawNumber>,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<RawNumber>,
    pub pool: Option<RawPool>,
    pub amount0: Option<RawNumber>,
    pub amount1: Option<RawNumber>,
    #[serde(rename = "amountUSD")]
    pub amount_usd: Option<RawNumber>,
    #[serde(alias = "owner")]
    pub sender: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFlashloan {
    pub id: Option<String>,
    pub timestamp: Option<RawNumber>,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<RawNumber>,
    pub token: Option<RawToken>,
    pub amount: Option<RawNumber>,
    #[serde(rename = "amountUSD")]
    pub amount_usd: Option<RawNumber>,
    pub initiator: Option<String>,
    pub fee: Option<RawNumber>,
}

/// Legacy transactions collection: one transaction embeds 0..N swaps that
/// share the transaction's id, block number and timestamp.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGraphTransaction {
    pub id: Option<String>,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<RawNumber>,
    pub timestamp: Option<RawNumber>,
    #[serde(default)]
    pub swaps: Vec<RawEmbeddedSwap>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEmbeddedSwap {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub token0: Option<RawToken>,
    pub token1: Option<RawToken>,
    pub amount0: Option<RawNumber>,
    pub amount1: Option<RawNumber>,
    #[serde(rename = "amountUSD")]
    pub amount_usd: Option<RawNumber>,
}

// ---------------------------------------------------------------------------
// JSON-RPC (Solana block) raw shapes
// ---------------------------------------------------------------------------

/// Raw block document in `jsonParsed` encoding.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBlock {
    #[serde(rename = "blockTime")]
    pub block_time: Option<i64>,
    #[serde(rename = "blockHeight")]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub transactions: Vec<RawBlockTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBlockTransaction {
    pub transaction: Option<RawTransactionBody>,
    pub meta: Option<RawTransactionMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTransactionBody {
    #[serde(default)]
    pub signatures: Vec<String>,
    pub message: Option<RawMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    #[serde(default, rename = "accountKeys")]
    pub account_keys: Vec<RawAccountKey>,
    #[serde(default)]
    pub instructions: Vec<RawInstruction>,
}

/// Account keys arrive as plain strings (base encoding) or as objects with a
/// `pubkey` field (`jsonParsed` encoding).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawAccountKey {
    Plain(String),
    Parsed { pubkey: String },
}

impl RawAccountKey {
    pub fn pubkey(&self) -> &str {
        match self {
            RawAccountKey::Plain(key) => key,
            RawAccountKey::Parsed { pubkey } => pubkey,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInstruction {
    #[serde(rename = "programId")]
    pub program_id: Option<String>,
    /// Either a bare string label or an object carrying a `type` field,
    /// depending on whether the provider recognized the instruction.
    pub parsed: Option<serde_json::Value>,
}

impl RawInstruction {
    /// Instruction label from the parsed payload, if the provider supplied one.
    pub fn instruction_label(&self) -> Option<String> {
        match &self.parsed {
            Some(serde_json::Value::String(label)) => Some(label.clone()),
            Some(serde_json::Value::Object(map)) => map
                .get("type")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTransactionMeta {
    #[serde(default, rename = "logMessages")]
    pub log_messages: Vec<String>,
    pub fee: Option<u64>,
    pub err: Option<serde_json::Value>,
    #[serde(rename = "computeUnitsConsumed")]
    pub compute_units_consumed: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_number_accepts_string_and_numeric_encodings() {
        let n: RawNumber = serde_json::from_str("\"123.5\"").unwrap();
        assert_eq!(n.as_f64(), Some(123.5));

        let n: RawNumber = serde_json::from_str("42").unwrap();
        assert_eq!(n.as_i64(), Some(42));

        let n: RawNumber = serde_json::from_str("\"not a number\"").unwrap();
        assert_eq!(n.as_f64(), None);
    }

    #[test]
    fn test_activity_page_record_count() {
        let json = r#"{
            "swaps": [{"id": "s1"}],
            "mints": [],
            "burns": [{"id": "b1"}, {"id": "b2"}],
            "transactions": [{"id": "t1", "swaps": [{}, {}]}]
        }"#;
        let page: RawActivityPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.record_count(), 6);
        assert!(!page.is_empty());
        assert_eq!(page.max_collection_len(), 2);

        let empty: RawActivityPage = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_account_key_shapes() {
        let plain: RawAccountKey = serde_json::from_str("\"Key111\"").unwrap();
        assert_eq!(plain.pubkey(), "Key111");

        let parsed: RawAccountKey =
            serde_json::from_str(r#"{"pubkey": "Key222", "signer": true}"#).unwrap();
        assert_eq!(parsed.pubkey(), "Key222");
    }

    #[test]
    fn test_instruction_label_extraction() {
        let bare: RawInstruction =
            serde_json::from_str(r#"{"programId": "P1", "parsed": "transfer"}"#).unwrap();
        assert_eq!(bare.instruction_label(), Some("transfer".to_string()));

        let typed: RawInstruction = serde_json::from_str(
            r#"{"programId": "P1", "parsed": {"type": "transferChecked", "info": {}}}"#,
        )
        .unwrap();
        assert_eq!(typed.instruction_label(), Some("transferChecked".to_string()));

        let opaque: RawInstruction = serde_json::from_str(r#"{"programId": "P1"}"#).unwrap();
        assert_eq!(opaque.instruction_label(), None);
    }
}
