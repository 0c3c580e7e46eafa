//! Raw record normalization
//!
//! Pure functions from one provider-specific raw record to a canonical
//! [`Event`] (or [`NormalizeError`]). Required fields must be present and
//! parseable; a missing amount is an error, never a silent zero. The one
//! deliberate exception is `amountUSD`: upstreams legitimately omit it, and
//! an omitted USD value normalizes to `None` - distinct from a reported
//! `0.0`, which means "no trade impact".
//!
//! A single raw transaction (embedded-swaps shape or block shape) may yield
//! 0..N outputs; callers skip individual malformed records and continue.

use crate::error::NormalizeError;
use crate::event::{Event, EventKind, PoolContext, TokenRef};
use crate::source::{
    RawBlockTransaction, RawEmbeddedSwap, RawFlashloan, RawGraphTransaction, RawNumber,
    RawPoolEvent, RawSwap, RawToken,
};

/// One program invocation observed in a raw block transaction, attributed
/// to the aggregator's usage statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramObservation {
    pub program_id: String,
    pub instruction: Option<String>,
}

/// Everything extracted from one raw block transaction: per-instruction
/// observations plus the full address set for classification.
#[derive(Debug, Clone)]
pub struct TransactionActivity {
    pub signature: String,
    pub observations: Vec<ProgramObservation>,
    pub account_keys: Vec<String>,
}

fn require<T>(
    value: Option<T>,
    record_kind: &'static str,
    key: &Option<String>,
    field: &'static str,
) -> Result<T, NormalizeError> {
    value.ok_or_else(|| NormalizeError::missing(record_kind, key.clone(), field))
}

fn parse_f64(
    value: &Option<RawNumber>,
    record_kind: &'static str,
    key: &Option<String>,
    field: &'static str,
) -> Result<f64, NormalizeError> {
    match value {
        None => Err(NormalizeError::missing(record_kind, key.clone(), field)),
        Some(raw) => raw.as_f64().ok_or_else(|| {
            NormalizeError::invalid(
                record_kind,
                key.clone(),
                format!("field `{}` is not numeric", field),
            )
        }),
    }
}

fn parse_timestamp(
    value: &Option<RawNumber>,
    record_kind: &'static str,
    key: &Option<String>,
) -> Result<i64, NormalizeError> {
    match value {
        None => Err(NormalizeError::missing(record_kind, key.clone(), "timestamp")),
        Some(raw) => raw.as_i64().ok_or_else(|| {
            NormalizeError::invalid(record_kind, key.clone(), "field `timestamp` is not numeric")
        }),
    }
}

fn parse_block_number(
    value: &Option<RawNumber>,
    record_kind: &'static str,
    key: &Option<String>,
) -> Result<u64, NormalizeError> {
    match value {
        None => Err(NormalizeError::missing(record_kind, key.clone(), "blockNumber")),
        Some(raw) => raw.as_u64().ok_or_else(|| {
            NormalizeError::invalid(
                record_kind,
                key.clone(),
                "field `blockNumber` is not a non-negative integer",
            )
        }),
    }
}

/// Optional USD amount: absent stays `None`; present but unparseable is an
/// error rather than a silent zero.
fn parse_amount_usd(
    value: &Option<RawNumber>,
    record_kind: &'static str,
    key: &Option<String>,
) -> Result<Option<f64>, NormalizeError> {
    match value {
        None => Ok(None),
        Some(raw) => raw.as_f64().map(Some).ok_or_else(|| {
            NormalizeError::invalid(record_kind, key.clone(), "field `amountUSD` is not numeric")
        }),
    }
}

fn token_ref(
    token: &Option<RawToken>,
    record_kind: &'static str,
    key: &Option<String>,
    field: &'static str,
) -> Result<TokenRef, NormalizeError> {
    let token = token
        .as_ref()
        .ok_or_else(|| NormalizeError::missing(record_kind, key.clone(), field))?;
    let address = token
        .id
        .clone()
        .ok_or_else(|| NormalizeError::missing(record_kind, key.clone(), field))?;
    // Symbol is cosmetic; fall back to the address when the subgraph has none.
    let symbol = token.symbol.clone().unwrap_or_else(|| address.clone());
    Ok(TokenRef { address, symbol })
}

/// Normalize one subgraph swap record.
pub fn normalize_swap(raw: &RawSwap) -> Result<Event, NormalizeError> {
    const KIND: &str = "swap";
    let key = raw.id.clone();
    let id = require(raw.id.clone(), KIND, &key, "id")?;

    let pool = match &raw.pool {
        Some(p) => {
            let token0_price = p.token0_price.as_ref().and_then(|n| n.as_f64());
            let token1_price = p.token1_price.as_ref().and_then(|n| n.as_f64());
            let liquidity = p.liquidity.as_ref().and_then(|n| n.as_f64());
            match (token0_price, token1_price, liquidity) {
                (Some(p0), Some(p1), Some(liq)) => Some(PoolContext {
                    token0_price: p0,
                    token1_price: p1,
                    liquidity: liq,
                }),
                _ => None,
            }
        }
        None => None,
    };

    Ok(Event {
        block_number: parse_block_number(&raw.block_number, KIND, &key)?,
        timestamp: parse_timestamp(&raw.timestamp, KIND, &key)?,
        amount_usd: parse_amount_usd(&raw.amount_usd, KIND, &key)?,
        kind: EventKind::Swap {
            sender: require(raw.sender.clone(), KIND, &key, "sender")?,
            recipient: require(raw.recipient.clone(), KIND, &key, "recipient")?,
            token0: token_ref(&raw.token0, KIND, &key, "token0")?,
            token1: token_ref(&raw.token1, KIND, &key, "token1")?,
            amount0: parse_f64(&raw.amount0, KIND, &key, "amount0")?,
            amount1: parse_f64(&raw.amount1, KIND, &key, "amount1")?,
            pool,
        },
        id,
    })
}

/// Normalize one subgraph mint or burn record (identical upstream shape).
fn normalize_pool_event(raw: &RawPoolEvent, is_mint: bool) -> Result<Event, NormalizeError> {
    let record_kind: &'static str = if is_mint { "mint" } else { "burn" };
    let key = raw.id.clone();
    let id = require(raw.id.clone(), record_kind, &key, "id")?;

    let pool = raw
        .pool
        .as_ref()
        .ok_or_else(|| NormalizeError::missing(record_kind, key.clone(), "pool"))?;
    let pool_id = pool
        .id
        .clone()
        .ok_or_else(|| NormalizeError::missing(record_kind, key.clone(), "pool.id"))?;

    let sender = require(raw.sender.clone(), record_kind, &key, "sender")?;
    let token0 = token_ref(&pool.token0, record_kind, &key, "pool.token0")?;
    let token1 = token_ref(&pool.token1, record_kind, &key, "pool.token1")?;
    let amount0 = parse_f64(&raw.amount0, record_kind, &key, "amount0")?;
    let amount1 = parse_f64(&raw.amount1, record_kind, &key, "amount1")?;

    let kind = if is_mint {
        EventKind::Mint {
            sender,
            pool_id,
            token0,
            token1,
            amount0,
            amount1,
        }
    } else {
        EventKind::Burn {
            sender,
            pool_id,
            token0,
            token1,
            amount0,
            amount1,
        }
    };

    Ok(Event {
        block_number: parse_block_number(&raw.block_number, record_kind, &key)?,
        timestamp: parse_timestamp(&raw.timestamp, record_kind, &key)?,
        amount_usd: parse_amount_usd(&raw.amount_usd, record_kind, &key)?,
        kind,
        id,
    })
}

pub fn normalize_mint(raw: &RawPoolEvent) -> Result<Event, NormalizeError> {
    normalize_pool_event(raw, true)
}

pub fn normalize_burn(raw: &RawPoolEvent) -> Result<Event, NormalizeError> {
    normalize_pool_event(raw, false)
}

/// Normalize one subgraph flash loan record.
pub fn normalize_flashloan(raw: &RawFlashloan) -> Result<Event, NormalizeError> {
    const KIND: &str = "flashloan";
    let key = raw.id.clone();
    let id = require(raw.id.clone(), KIND, &key, "id")?;

    Ok(Event {
        block_number: parse_block_number(&raw.block_number, KIND, &key)?,
        timestamp: parse_timestamp(&raw.timestamp, KIND, &key)?,
        amount_usd: parse_amount_usd(&raw.amount_usd, KIND, &key)?,
        kind: EventKind::Flashloan {
            initiator: require(raw.initiator.clone(), KIND, &key, "initiator")?,
            token: token_ref(&raw.token, KIND, &key, "token")?,
            amount: parse_f64(&raw.amount, KIND, &key, "amount")?,
            fee: parse_f64(&raw.fee, KIND, &key, "fee")?,
        },
        id,
    })
}

/// Normalize the legacy transactions-with-embedded-swaps shape: one event
/// per embedded swap, ids suffixed with the swap's position so a
/// multi-swap transaction cannot collapse onto a single primary key.
pub fn normalize_graph_transaction(
    raw: &RawGraphTransaction,
) -> Vec<Result<Event, NormalizeError>> {
    const KIND: &str = "transaction";
    let key = raw.id.clone();

    let header = (|| {
        let id = require(raw.id.clone(), KIND, &key, "id")?;
        let block_number = parse_block_number(&raw.block_number, KIND, &key)?;
        let timestamp = parse_timestamp(&raw.timestamp, KIND, &key)?;
        Ok::<_, NormalizeError>((id, block_number, timestamp))
    })();

    let (tx_id, block_number, timestamp) = match header {
        Ok(header) => header,
        // A broken header poisons every embedded swap; report it once.
        Err(e) => return vec![Err(e)],
    };

    raw.swaps
        .iter()
        .enumerate()
        .map(|(index, swap)| {
            normalize_embedded_swap(swap, &tx_id, index, block_number, timestamp)
        })
        .collect()
}

fn normalize_embedded_swap(
    raw: &RawEmbeddedSwap,
    tx_id: &str,
    index: usize,
    block_number: u64,
    timestamp: i64,
) -> Result<Event, NormalizeError> {
    const KIND: &str = "transaction.swap";
    let id = format!("{}#{}", tx_id, index);
    let key = Some(id.clone());

    Ok(Event {
        id: id.clone(),
        block_number,
        timestamp,
        amount_usd: parse_amount_usd(&raw.amount_usd, KIND, &key)?,
        kind: EventKind::Swap {
            sender: require(raw.sender.clone(), KIND, &key, "sender")?,
            recipient: require(raw.recipient.clone(), KIND, &key, "recipient")?,
            token0: token_ref(&raw.token0, KIND, &key, "token0")?,
            token1: token_ref(&raw.token1, KIND, &key, "token1")?,
            amount0: parse_f64(&raw.amount0, KIND, &key, "amount0")?,
            amount1: parse_f64(&raw.amount1, KIND, &key, "amount1")?,
            pool: None,
        },
    })
}

/// Extract per-instruction program observations and the full account key
/// set from one raw block transaction.
///
/// Instruction labels come from the parsed payload when the provider
/// recognized the instruction, otherwise from `"Program log: Instruction:"`
/// lines in the transaction's log messages.
pub fn normalize_block_transaction(
    raw: &RawBlockTransaction,
) -> Result<TransactionActivity, NormalizeError> {
    const KIND: &str = "block_transaction";

    let body = raw
        .transaction
        .as_ref()
        .ok_or_else(|| NormalizeError::missing(KIND, None, "transaction"))?;
    let signature = body
        .signatures
        .first()
        .cloned()
        .ok_or_else(|| NormalizeError::missing(KIND, None, "signatures"))?;
    let key = Some(signature.clone());
    let message = body
        .message
        .as_ref()
        .ok_or_else(|| NormalizeError::missing(KIND, key.clone(), "message"))?;

    let mut observations = Vec::with_capacity(message.instructions.len());
    for instruction in &message.instructions {
        let program_id = match &instruction.program_id {
            Some(id) => id.clone(),
            None => continue, // inner-instruction stubs without a program id
        };
        observations.push(ProgramObservation {
            instruction: instruction.instruction_label(),
            program_id,
        });
    }

    // Log lines name instructions the parsed payload missed; attach them to
    // observations that still have no label.
    if let Some(meta) = &raw.meta {
        let logged: Vec<String> = meta
            .log_messages
            .iter()
            .filter_map(|line| line.split("Instruction:").nth(1))
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        let mut logged_iter = logged.into_iter();
        for obs in observations.iter_mut().filter(|o| o.instruction.is_none()) {
            match logged_iter.next() {
                Some(label) => obs.instruction = Some(label),
                None => break,
            }
        }
    }

    let account_keys = message
        .account_keys
        .iter()
        .map(|k| k.pubkey().to_string())
        .collect();

    Ok(TransactionActivity {
        signature,
        observations,
        account_keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{RawActivityPage, RawBlock};

    fn sample_page() -> RawActivityPage {
        let json = r#"{
            "swaps": [{
                "id": "0xswap1",
                "timestamp": "1700000100",
                "blockNumber": "18500000",
                "sender": "0xalice",
                "recipient": "0xpool",
                "token0": {"id": "0xt0", "symbol": "WETH", "decimals": "18"},
                "token1": {"id": "0xt1", "symbol": "USDC", "decimals": "6"},
                "amount0": "-1.25",
                "amount1": "2400.50",
                "amountUSD": "2400.73",
                "pool": {"token0Price": "1920.4", "token1Price": "0.00052", "liquidity": "123456789"}
            }],
            "mints": [{
                "id": "0xmint1",
                "timestamp": "1700000200",
                "blockNumber": "18500010",
                "pool": {
                    "id": "0xpoolA",
                    "token0": {"id": "0xt0", "symbol": "WETH"},
                    "token1": {"id": "0xt1", "symbol": "USDC"}
                },
                "amount0": "2.0",
                "amount1": "3800.0",
                "amountUSD": "7600.0",
                "sender": "0xlp"
            }],
            "burns": [],
            "flashLoans": [{
                "id": "0xfl1",
                "timestamp": "1700000300",
                "blockNumber": "18500020",
                "token": {"id": "0xdai", "symbol": "DAI"},
                "amount": "1000000",
                "fee": "900",
                "initiator": "0xarb"
            }]
        }"#;
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_normalize_swap_full_record() {
        let page = sample_page();
        let event = normalize_swap(&page.swaps[0]).unwrap();

        assert_eq!(event.id, "0xswap1");
        assert_eq!(event.block_number, 18_500_000);
        assert_eq!(event.timestamp, 1_700_000_100);
        assert_eq!(event.amount_usd, Some(2400.73));
        match event.kind {
            EventKind::Swap {
                amount0,
                amount1,
                ref pool,
                ..
            } => {
                assert_eq!(amount0, -1.25);
                assert_eq!(amount1, 2400.50);
                assert_eq!(pool.as_ref().unwrap().liquidity, 123_456_789.0);
            }
            _ => panic!("expected a swap"),
        }
    }

    #[test]
    fn test_normalize_mint_takes_pool_tokens() {
        let page = sample_page();
        let event = normalize_mint(&page.mints[0]).unwrap();
        assert_eq!(event.origin(), "0xpoolA");
        match event.kind {
            EventKind::Mint { ref token0, .. } => assert_eq!(token0.symbol, "WETH"),
            _ => panic!("expected a mint"),
        }
    }

    #[test]
    fn test_missing_usd_amount_is_unknown_not_zero() {
        let page = sample_page();
        let event = normalize_flashloan(&page.flash_loans[0]).unwrap();
        assert_eq!(event.amount_usd, None);
        assert_eq!(event.event_type(), "flashloan");
    }

    #[test]
    fn test_missing_required_amount_fails() {
        let json = r#"{
            "id": "0xswap2",
            "timestamp": 1700000100,
            "blockNumber": 18500000,
            "sender": "0xa",
            "recipient": "0xb",
            "token0": {"id": "0xt0", "symbol": "A"},
            "token1": {"id": "0xt1", "symbol": "B"},
            "amount1": "5.0"
        }"#;
        let raw: RawSwap = serde_json::from_str(json).unwrap();
        let err = normalize_swap(&raw).unwrap_err();
        assert!(err.reason.contains("amount0"));
    }

    #[test]
    fn test_non_numeric_amount_fails_instead_of_coercing() {
        let json = r#"{
            "id": "0xswap3",
            "timestamp": 1700000100,
            "blockNumber": 18500000,
            "sender": "0xa",
            "recipient": "0xb",
            "token0": {"id": "0xt0", "symbol": "A"},
            "token1": {"id": "0xt1", "symbol": "B"},
            "amount0": "garbage",
            "amount1": "5.0"
        }"#;
        let raw: RawSwap = serde_json::from_str(json).unwrap();
        let err = normalize_swap(&raw).unwrap_err();
        assert!(err.reason.contains("amount0"));
    }

    #[test]
    fn test_graph_transaction_yields_one_event_per_swap() {
        let json = r#"{
            "id": "0xtx1",
            "blockNumber": "18500000",
            "timestamp": "1700000100",
            "swaps": [
                {
                    "sender": "0xa", "recipient": "0xb",
                    "token0": {"id": "0xt0", "symbol": "A"},
                    "token1": {"id": "0xt1", "symbol": "B"},
                    "amount0": "1.0", "amount1": "-2.0", "amountUSD": "10"
                },
                {
                    "sender": "0xc", "recipient": "0xd",
                    "token0": {"id": "0xt0", "symbol": "A"},
                    "token1": {"id": "0xt1", "symbol": "B"},
                    "amount0": "3.0", "amount1": "-6.0", "amountUSD": "30"
                }
            ]
        }"#;
        let raw: RawGraphTransaction = serde_json::from_str(json).unwrap();
        let events: Vec<Event> = normalize_graph_transaction(&raw)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, "0xtx1#0");
        assert_eq!(events[1].id, "0xtx1#1");
        assert_eq!(events[0].timestamp, events[1].timestamp);
    }

    #[test]
    fn test_graph_transaction_skips_only_bad_swaps() {
        let json = r#"{
            "id": "0xtx2",
            "blockNumber": 18500000,
            "timestamp": 1700000100,
            "swaps": [
                {"sender": "0xa"},
                {
                    "sender": "0xc", "recipient": "0xd",
                    "token0": {"id": "0xt0", "symbol": "A"},
                    "token1": {"id": "0xt1", "symbol": "B"},
                    "amount0": "3.0", "amount1": "-6.0"
                }
            ]
        }"#;
        let raw: RawGraphTransaction = serde_json::from_str(json).unwrap();
        let results = normalize_graph_transaction(&raw);

        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        let good = results[1].as_ref().unwrap();
        assert_eq!(good.id, "0xtx2#1");
        assert_eq!(good.amount_usd, None);
    }

    #[test]
    fn test_normalize_block_transaction() {
        let json = r#"{
            "blockTime": 1700000000,
            "transactions": [{
                "transaction": {
                    "signatures": ["5sig111"],
                    "message": {
                        "accountKeys": [
                            {"pubkey": "FeePayer111"},
                            {"pubkey": "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8"}
                        ],
                        "instructions": [
                            {"programId": "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8"},
                            {"programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                             "parsed": {"type": "transfer", "info": {}}}
                        ]
                    }
                },
                "meta": {
                    "logMessages": ["Program log: Instruction: SwapBaseIn"]
                }
            }]
        }"#;
        let block: RawBlock = serde_json::from_str(json).unwrap();
        let activity = normalize_block_transaction(&block.transactions[0]).unwrap();

        assert_eq!(activity.signature, "5sig111");
        assert_eq!(activity.observations.len(), 2);
        // Unlabeled Raydium instruction picks up the logged instruction name.
        assert_eq!(
            activity.observations[0].instruction.as_deref(),
            Some("SwapBaseIn")
        );
        assert_eq!(
            activity.observations[1].instruction.as_deref(),
            Some("transfer")
        );
        assert!(activity
            .account_keys
            .contains(&"FeePayer111".to_string()));
    }

    #[test]
    fn test_block_transaction_without_signature_is_malformed() {
        let json = r#"{"transaction": {"signatures": [], "message": {"accountKeys": [], "instructions": []}}}"#;
        let raw: RawBlockTransaction = serde_json::from_str(json).unwrap();
        let err = normalize_block_transaction(&raw).unwrap_err();
        assert!(err.reason.contains("signatures"));
    }
}
