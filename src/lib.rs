//! chainflow - on-chain activity normalization and statistics pipeline
//!
//! Ingests swap/mint/burn/flashloan activity from two upstream sources
//! (a JSON-RPC block source and a paginated GraphQL indexer), normalizes
//! heterogeneous raw shapes into a canonical event schema, classifies
//! originating programs, accumulates usage statistics, and persists results
//! idempotently into SQLite with time-based retention.
//!
//! # Architecture
//!
//! ```text
//! Source (RPC block / GraphQL page)
//!     ↓
//! Normalizer (raw record → canonical Event, per-record skip on malformed)
//!     ↓
//! Classifier (DEX / CEX / token-transfer labels)
//!     ↓
//! UsageAggregator (in-memory program usage counters)
//!     ↓
//! EventStore (idempotent batch upsert, windowed reads, retention)
//! ```

pub mod aggregator;
pub mod backoff;
pub mod classifier;
pub mod config;
pub mod error;
pub mod event;
pub mod normalizer;
pub mod poller;
pub mod retention;
pub mod source;
pub mod store;

pub use aggregator::{ProgramUsage, UsageAggregator, UsageSnapshot};
pub use classifier::{Classifier, Label};
pub use config::Config;
pub use error::{ConfigError, NormalizeError, SourceError, StoreError};
pub use event::{Event, EventKind, PoolContext, TokenRef};
pub use poller::{Cursor, Poller, PollerOptions, PollerState};
pub use store::{EventStore, HourBucket, RetentionReport, TokenVolume, UpsertReport};
