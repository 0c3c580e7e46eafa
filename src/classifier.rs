//! Address-table event classification
//!
//! Deterministic labeling against static lookup tables: known DEX programs,
//! known CEX wallets, the token program. Classification never fails; an
//! event touching no known address gets the `Unknown` label and nothing
//! else. Tables are fixed at construction, so the same event always yields
//! the same label set.

use crate::event::Event;
use std::collections::{BTreeSet, HashMap};

/// A label attached to an event by table lookup. `Ord` so label sets have a
/// stable iteration order independent of match order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Label {
    /// Known decentralized exchange program, with its venue name.
    Dex(String),
    /// Known centralized exchange wallet, with its venue name.
    Cex(String),
    /// The address set touches the token program.
    TokenTransfer,
    /// No table matched.
    Unknown,
}

impl Label {
    pub fn describe(&self) -> String {
        match self {
            Label::Dex(name) => format!("DEX:{}", name),
            Label::Cex(name) => format!("CEX:{}", name),
            Label::TokenTransfer => "TOKEN_TRANSFER".to_string(),
            Label::Unknown => "UNKNOWN".to_string(),
        }
    }
}

pub struct Classifier {
    dex_programs: HashMap<String, String>,
    cex_wallets: HashMap<String, String>,
    token_programs: BTreeSet<String>,
}

impl Classifier {
    /// Classifier with the built-in venue tables.
    pub fn new() -> Self {
        let mut dex_programs = HashMap::new();
        dex_programs.insert(
            "srmqPvymJeFKQ4zGQed1GFppgkRHL9kaELCbyksJtPX".to_string(),
            "Serum DEX".to_string(),
        );
        dex_programs.insert(
            "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8".to_string(),
            "Raydium".to_string(),
        );
        dex_programs.insert(
            "9W959DqEETiGZocYWCQPaJ6sBmUzgfxXfqGeTEdp3aQP".to_string(),
            "Raydium Swap".to_string(),
        );
        dex_programs.insert(
            "JUP4Fb2cqiRUcaTHdrPC8h2gNsA2ETXiPDD33WcGuJB".to_string(),
            "Jupiter".to_string(),
        );
        dex_programs.insert(
            "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc".to_string(),
            "Orca".to_string(),
        );

        let mut cex_wallets = HashMap::new();
        cex_wallets.insert(
            "7KBVh9TqtkQHJkMA6dxNLjphVF1jzUE3E3YEBRKgEHmL".to_string(),
            "Binance Hot Wallet".to_string(),
        );
        cex_wallets.insert(
            "SysvarC1ock11111111111111111111111111111111".to_string(),
            "Kraken Hot Wallet".to_string(),
        );

        let mut token_programs = BTreeSet::new();
        token_programs.insert("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA".to_string());

        Self {
            dex_programs,
            cex_wallets,
            token_programs,
        }
    }

    /// Classifier with caller-supplied tables. Tests use this to avoid
    /// coupling assertions to the built-in venue lists.
    pub fn with_tables(
        dex_programs: HashMap<String, String>,
        cex_wallets: HashMap<String, String>,
        token_programs: BTreeSet<String>,
    ) -> Self {
        Self {
            dex_programs,
            cex_wallets,
            token_programs,
        }
    }

    /// Label name for a known program id, if any table knows it.
    pub fn venue_name(&self, address: &str) -> Option<&str> {
        self.dex_programs
            .get(address)
            .or_else(|| self.cex_wallets.get(address))
            .map(String::as_str)
    }

    /// All labels matching the given address set. A set matching nothing
    /// classifies as `{Unknown}`; `Unknown` never coexists with a real label.
    pub fn classify_addresses<'a, I>(&self, addresses: I) -> BTreeSet<Label>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut labels = BTreeSet::new();

        for address in addresses {
            if let Some(venue) = self.dex_programs.get(address) {
                labels.insert(Label::Dex(venue.clone()));
            }
            if let Some(venue) = self.cex_wallets.get(address) {
                labels.insert(Label::Cex(venue.clone()));
            }
            if self.token_programs.contains(address) {
                labels.insert(Label::TokenTransfer);
            }
        }

        if labels.is_empty() {
            labels.insert(Label::Unknown);
        }
        labels
    }

    /// Labels for a canonical event, from every address it references.
    pub fn classify(&self, event: &Event) -> BTreeSet<Label> {
        self.classify_addresses(event.referenced_addresses())
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}
