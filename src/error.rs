//! Error taxonomy for the ingestion pipeline
//!
//! Transient failures (`SourceError`, `StoreError::Unavailable`) are retried
//! by the poller without advancing its cursor. Permanent per-record failures
//! (`NormalizeError`, `StoreError::Constraint`) are skipped and logged.
//! `ConfigError` is fatal and aborts startup before the loop is entered.

use std::fmt;

/// Transient fetch failure from an upstream source.
///
/// Always retryable at the poller level; never fatal to the pipeline.
#[derive(Debug)]
pub enum SourceError {
    /// Network-level failure (connect, timeout, TLS).
    Http(String),
    /// Non-success HTTP status from the provider.
    Status(u16),
    /// Response body could not be decoded into the expected shape.
    Decode(String),
    /// GraphQL-level `errors` array in an otherwise successful response.
    Graph(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Http(e) => write!(f, "source unavailable: {}", e),
            SourceError::Status(code) => write!(f, "source returned HTTP {}", code),
            SourceError::Decode(e) => write!(f, "source response malformed: {}", e),
            SourceError::Graph(e) => write!(f, "graphql error: {}", e),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else {
            SourceError::Http(err.to_string())
        }
    }
}

/// A raw record that cannot be normalized into a canonical event.
///
/// Permanent and per-record: the poller logs the identifying key and skips
/// it without aborting the rest of the batch.
#[derive(Debug, Clone)]
pub struct NormalizeError {
    /// Which raw shape failed ("swap", "mint", "block_transaction", ...).
    pub record_kind: &'static str,
    /// Identifying key of the raw record, if one could be extracted.
    pub key: Option<String>,
    /// The field or condition that failed.
    pub reason: String,
}

impl NormalizeError {
    pub fn missing(record_kind: &'static str, key: Option<String>, field: &str) -> Self {
        Self {
            record_kind,
            key,
            reason: format!("missing required field `{}`", field),
        }
    }

    pub fn invalid(record_kind: &'static str, key: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            record_kind,
            key,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed {} record ({}): {}",
            self.record_kind,
            self.key.as_deref().unwrap_or("<no id>"),
            self.reason
        )
    }
}

impl std::error::Error for NormalizeError {}

/// Persistence failure.
#[derive(Debug)]
pub enum StoreError {
    /// Per-record constraint failure (foreign key mismatch, bad detail row).
    /// Skipped with a warning; never aborts the remaining batch. Duplicate
    /// primary keys are NOT constraint violations - they are no-ops.
    Constraint { id: String, reason: String },
    /// Connection/transaction-level failure. The whole batch is retried once,
    /// then the cycle is abandoned with the cursor unchanged.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Constraint { id, reason } => {
                write!(f, "constraint violation on `{}`: {}", id, reason)
            }
            StoreError::Unavailable(e) => write!(f, "store unavailable: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Invalid startup configuration. Fatal; the pipeline loop is never entered.
#[derive(Debug)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}
