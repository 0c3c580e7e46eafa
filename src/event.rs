//! Canonical event schema
//!
//! Every raw record from any supported source normalizes into one `Event`.
//! The `id` is globally unique per source and is the primary key in the
//! store; redelivery of the same id must never create a duplicate row.

use serde::{Deserialize, Serialize};

/// A token identity: on-chain address plus display symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRef {
    pub address: String,
    pub symbol: String,
}

impl TokenRef {
    pub fn new(address: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            symbol: symbol.into(),
        }
    }
}

/// Optional pool context attached to swap events when the upstream reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolContext {
    pub token0_price: f64,
    pub token1_price: f64,
    pub liquidity: f64,
}

/// Type-specific payload of a canonical event.
///
/// Swap amounts are signed (sign indicates direction); mint/burn/flashloan
/// amounts are unsigned by convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Swap {
        sender: String,
        recipient: String,
        token0: TokenRef,
        token1: TokenRef,
        amount0: f64,
        amount1: f64,
        pool: Option<PoolContext>,
    },
    Mint {
        sender: String,
        pool_id: String,
        token0: TokenRef,
        token1: TokenRef,
        amount0: f64,
        amount1: f64,
    },
    Burn {
        sender: String,
        pool_id: String,
        token0: TokenRef,
        token1: TokenRef,
        amount0: f64,
        amount1: f64,
    },
    Flashloan {
        initiator: String,
        token: TokenRef,
        amount: f64,
        fee: f64,
    },
}

/// One canonical swap/mint/burn/flashloan record.
///
/// `amount_usd` is `None` when the upstream did not report a USD value.
/// `Some(0.0)` means the upstream explicitly reported zero trade impact -
/// the two are never conflated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub block_number: u64,
    pub timestamp: i64,
    pub amount_usd: Option<f64>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    /// Stable type tag, used as the `event_type` column and as the
    /// instruction label recorded into program usage statistics.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            EventKind::Swap { .. } => "swap",
            EventKind::Mint { .. } => "mint",
            EventKind::Burn { .. } => "burn",
            EventKind::Flashloan { .. } => "flashloan",
        }
    }

    /// The originating program/contract address this event is attributed to.
    ///
    /// Subgraph records carry no invoking program id, so the closest on-chain
    /// contract address stands in: the pool for mint/burn, the recipient for
    /// swaps, the initiator for flashloans.
    pub fn origin(&self) -> &str {
        match &self.kind {
            EventKind::Swap { recipient, .. } => recipient,
            EventKind::Mint { pool_id, .. } => pool_id,
            EventKind::Burn { pool_id, .. } => pool_id,
            EventKind::Flashloan { initiator, .. } => initiator,
        }
    }

    /// Every address the classifier inspects: origin, counterparties and
    /// token/pool identifiers.
    pub fn referenced_addresses(&self) -> Vec<&str> {
        match &self.kind {
            EventKind::Swap {
                sender,
                recipient,
                token0,
                token1,
                ..
            } => vec![sender, recipient, &token0.address, &token1.address],
            EventKind::Mint {
                sender,
                pool_id,
                token0,
                token1,
                ..
            }
            | EventKind::Burn {
                sender,
                pool_id,
                token0,
                token1,
                ..
            } => vec![sender, pool_id, &token0.address, &token1.address],
            EventKind::Flashloan {
                initiator, token, ..
            } => vec![initiator, &token.address],
        }
    }
}
