//! SQLite event store
//!
//! Durable storage for canonical events, program usage counters and slot
//! markers. Writes are idempotent: the event id is the primary key and
//! redelivery is absorbed with INSERT OR IGNORE, so replaying a window or a
//! block never changes stored totals. Each event writes a base row plus a
//! per-type detail row atomically; a failed detail insert takes the base
//! row down with it.

use crate::aggregator::ProgramUsage;
use crate::error::StoreError;
use crate::event::{Event, EventKind, PoolContext, TokenRef};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;

const HOUR_SECS: i64 = 3600;

/// Outcome of one batch upsert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertReport {
    /// Ids of events newly inserted by this batch, in input order. Only
    /// these feed usage counters, which keeps replays from double-counting.
    pub inserted: Vec<String>,
    /// Events whose id already existed.
    pub duplicates: u64,
    /// Events rejected by a constraint and skipped.
    pub skipped: u64,
}

/// One hourly bucket of a read window. Buckets with no events report zero
/// counts rather than being absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HourBucket {
    pub bucket_start: i64,
    pub events: u64,
    pub swaps: u64,
    pub mints: u64,
    pub burns: u64,
    pub flashloans: u64,
    /// USD sums cover events with a known amount; unknown amounts
    /// contribute nothing (they are not zeros).
    pub total_usd: f64,
    pub swap_usd: f64,
    pub mint_usd: f64,
    pub burn_usd: f64,
    pub flashloan_usd: f64,
}

/// Aggregate volume attributed to one token across stored swaps.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenVolume {
    pub address: String,
    pub symbol: String,
    /// Summed over swaps with a known USD amount only.
    pub total_usd: f64,
    /// Sum of absolute raw token amounts across all swaps touching the token.
    pub total_amount: f64,
    pub swap_count: u64,
}

/// Outcome of one retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RetentionReport {
    pub archived: u64,
    pub deleted: u64,
}

/// Durable program usage row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProgram {
    pub program_id: String,
    pub venue: Option<String>,
    pub total_calls: u64,
    pub first_seen: i64,
    pub last_seen: i64,
}

/// One program invocation to fold into the durable usage counters.
#[derive(Debug, Clone)]
pub struct ProgramCall {
    pub program_id: String,
    pub venue: Option<String>,
    pub timestamp: i64,
    pub instruction: Option<String>,
}

/// Compact event row for reporting queries.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSummary {
    pub id: String,
    pub block_number: u64,
    pub timestamp: i64,
    pub event_type: String,
    pub amount_usd: Option<f64>,
}

pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!(
                        "cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        conn.execute_batch(SCHEMA)?;
        log::info!("✅ Event store initialized with WAL mode");

        Ok(Self { conn })
    }

    /// Insert a batch of events in one transaction. Redelivered ids are
    /// counted as duplicates and leave existing rows untouched; events a
    /// constraint rejects are skipped without failing the batch.
    pub fn upsert_batch(&mut self, events: &[Event]) -> Result<UpsertReport, StoreError> {
        self.upsert_inner(events, None)
    }

    /// Like [`EventStore::upsert_batch`], with one [`ProgramCall`] per event
    /// folded into the usage counters in the same transaction, and only when
    /// its event actually inserts. Rows and counters therefore commit (or
    /// fail) together: a replayed id changes neither, and a crash between
    /// them is impossible.
    pub fn upsert_batch_attributed(
        &mut self,
        events: &[Event],
        calls: &[ProgramCall],
    ) -> Result<UpsertReport, StoreError> {
        if events.len() != calls.len() {
            return Err(StoreError::Unavailable(format!(
                "attributed upsert needs one call per event, got {} events and {} calls",
                events.len(),
                calls.len()
            )));
        }
        self.upsert_inner(events, Some(calls))
    }

    fn upsert_inner(
        &mut self,
        events: &[Event],
        calls: Option<&[ProgramCall]>,
    ) -> Result<UpsertReport, StoreError> {
        let tx = self.conn.transaction()?;
        let mut report = UpsertReport::default();

        for (index, event) in events.iter().enumerate() {
            // Savepoint scopes the base+detail+counter group: a failure in
            // any of them rolls the whole event back instead of leaving a
            // detail-less row or a counted-but-absent event.
            tx.execute_batch("SAVEPOINT event_upsert")?;
            let result = insert_event(&tx, event).and_then(|inserted| {
                if inserted {
                    if let Some(calls) = calls {
                        apply_program_call(&tx, &calls[index])?;
                    }
                }
                Ok(inserted)
            });
            match result {
                Ok(true) => {
                    tx.execute_batch("RELEASE event_upsert")?;
                    report.inserted.push(event.id.clone());
                }
                Ok(false) => {
                    tx.execute_batch("RELEASE event_upsert")?;
                    report.duplicates += 1;
                }
                Err(e) => {
                    tx.execute_batch("ROLLBACK TO event_upsert; RELEASE event_upsert")?;
                    log::warn!("Skipping event {}: {}", event.id, e);
                    report.skipped += 1;
                }
            }
        }

        tx.commit()?;
        log::debug!(
            "Upsert batch: {} inserted, {} duplicate, {} skipped",
            report.inserted.len(),
            report.duplicates,
            report.skipped
        );
        Ok(report)
    }

    /// Hourly buckets over the half-open window `[start_ts, end_ts)`.
    /// Every hour in the window appears, zero-filled where nothing landed.
    pub fn read_window(&self, start_ts: i64, end_ts: i64) -> Result<Vec<HourBucket>, StoreError> {
        if end_ts <= start_ts {
            return Ok(Vec::new());
        }

        let bucket_count = ((end_ts - start_ts + HOUR_SECS - 1) / HOUR_SECS) as usize;
        let mut buckets: Vec<HourBucket> = (0..bucket_count)
            .map(|i| HourBucket {
                bucket_start: start_ts + i as i64 * HOUR_SECS,
                ..HourBucket::default()
            })
            .collect();

        let mut stmt = self.conn.prepare(
            "SELECT (timestamp - ?1) / 3600 AS bucket,
                    event_type,
                    COUNT(*),
                    COALESCE(SUM(amount_usd), 0.0)
             FROM events
             WHERE timestamp >= ?1 AND timestamp < ?2
             GROUP BY bucket, event_type",
        )?;
        let rows = stmt.query_map(params![start_ts, end_ts], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u64>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;

        for row in rows {
            let (bucket, event_type, count, usd) = row?;
            if let Some(slot) = buckets.get_mut(bucket as usize) {
                slot.events += count;
                slot.total_usd += usd;
                match event_type.as_str() {
                    "swap" => {
                        slot.swaps += count;
                        slot.swap_usd += usd;
                    }
                    "mint" => {
                        slot.mints += count;
                        slot.mint_usd += usd;
                    }
                    "burn" => {
                        slot.burns += count;
                        slot.burn_usd += usd;
                    }
                    "flashloan" => {
                        slot.flashloans += count;
                        slot.flashloan_usd += usd;
                    }
                    _ => {}
                }
            }
        }

        Ok(buckets)
    }

    /// Tokens in `[start_ts, end_ts)` ranked by swap USD volume descending,
    /// ties broken by token address so the ordering is reproducible. Swaps
    /// without a USD amount still contribute raw amounts and counts, but
    /// nothing to the USD sums.
    pub fn top_token_volume(
        &self,
        start_ts: i64,
        end_ts: i64,
        limit: usize,
    ) -> Result<Vec<TokenVolume>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT address, symbol,
                    COALESCE(SUM(usd), 0.0) AS total_usd,
                    SUM(ABS(amount)) AS total_amount,
                    COUNT(*) AS swaps
             FROM (
                 SELECT d.token0_address AS address, d.token0_symbol AS symbol,
                        d.amount0 AS amount, e.amount_usd AS usd
                 FROM swap_details d JOIN events e ON e.id = d.event_id
                 WHERE e.timestamp >= ?1 AND e.timestamp < ?2
                 UNION ALL
                 SELECT d.token1_address, d.token1_symbol, d.amount1, e.amount_usd
                 FROM swap_details d JOIN events e ON e.id = d.event_id
                 WHERE e.timestamp >= ?1 AND e.timestamp < ?2
             )
             GROUP BY address
             ORDER BY total_usd DESC, address ASC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![start_ts, end_ts, limit as i64], |row| {
            Ok(TokenVolume {
                address: row.get(0)?,
                symbol: row.get(1)?,
                total_usd: row.get(2)?,
                total_amount: row.get(3)?,
                swap_count: row.get(4)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Archive-then-delete everything strictly older than `cutoff_ts`.
    /// With `archive` set, rows land in the mirror tables in the same
    /// transaction that deletes them; a failure leaves both sides untouched.
    pub fn apply_retention(
        &mut self,
        cutoff_ts: i64,
        archive: bool,
    ) -> Result<RetentionReport, StoreError> {
        let tx = self.conn.transaction()?;
        let mut report = RetentionReport::default();

        if archive {
            for (detail, archive_table) in DETAIL_TABLES {
                tx.execute(
                    &format!(
                        "INSERT OR IGNORE INTO {archive} SELECT d.* FROM {detail} d
                         JOIN events e ON e.id = d.event_id WHERE e.timestamp < ?1",
                        archive = archive_table,
                        detail = detail
                    ),
                    params![cutoff_ts],
                )?;
            }
            report.archived = tx.execute(
                "INSERT OR IGNORE INTO events_archive
                 SELECT * FROM events WHERE timestamp < ?1",
                params![cutoff_ts],
            )? as u64;
        }

        for (detail, _) in DETAIL_TABLES {
            tx.execute(
                &format!(
                    "DELETE FROM {detail} WHERE event_id IN
                     (SELECT id FROM events WHERE timestamp < ?1)",
                    detail = detail
                ),
                params![cutoff_ts],
            )?;
        }
        report.deleted = tx.execute(
            "DELETE FROM events WHERE timestamp < ?1",
            params![cutoff_ts],
        )? as u64;

        tx.commit()?;

        if report.deleted > 0 {
            log::info!(
                "🧹 Retention sweep: {} events removed, {} archived (cutoff {})",
                report.deleted,
                report.archived,
                cutoff_ts
            );
        }
        Ok(report)
    }

    /// Fold a batch of program invocations into the durable usage counters.
    /// Counters are additive, so callers must pass each invocation exactly
    /// once; replay protection happens upstream via
    /// [`EventStore::upsert_batch_attributed`] and
    /// [`EventStore::record_block_usage`], which carry their own calls.
    pub fn record_program_calls(&mut self, calls: &[ProgramCall]) -> Result<(), StoreError> {
        if calls.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        for call in calls {
            apply_program_call(&tx, call)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Mark a slot processed and fold its program invocations into the
    /// usage counters, in one transaction. Returns `false` without touching
    /// the counters when the slot was already marked, so a replayed block
    /// can never re-count; returns `true` once the marker and the counters
    /// have committed together.
    pub fn record_block_usage(
        &mut self,
        slot: u64,
        calls: &[ProgramCall],
    ) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "INSERT OR IGNORE INTO blocks_seen (slot) VALUES (?1)",
            params![slot as i64],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        for call in calls {
            apply_program_call(&tx, call)?;
        }
        tx.commit()?;
        Ok(true)
    }

    /// Durable program ranking: call count descending, then earliest
    /// first-seen, then program id.
    pub fn top_programs(&self, limit: usize) -> Result<Vec<StoredProgram>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT program_id, venue, total_calls, first_seen, last_seen
             FROM programs
             ORDER BY total_calls DESC, first_seen ASC, program_id ASC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(StoredProgram {
                program_id: row.get(0)?,
                venue: row.get(1)?,
                total_calls: row.get(2)?,
                first_seen: row.get(3)?,
                last_seen: row.get(4)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Rehydrate an in-memory usage snapshot from the durable counters,
    /// used to seed the aggregator after a restart.
    pub fn load_program_usage(&self) -> Result<Vec<ProgramUsage>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT program_id, total_calls, first_seen, last_seen
             FROM programs ORDER BY first_seen ASC, program_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut usage = Vec::new();
        for row in rows {
            let (program_id, total_calls, first_seen, last_seen) = row?;
            let mut stmt = self.conn.prepare(
                "SELECT instruction, calls FROM program_instructions WHERE program_id = ?1",
            )?;
            let instructions = stmt
                .query_map(params![program_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
                })?
                .collect::<Result<_, _>>()?;

            usage.push(ProgramUsage::restored(
                program_id,
                total_calls,
                first_seen,
                last_seen,
                instructions,
            ));
        }
        Ok(usage)
    }

    pub fn recent_events(&self, limit: usize) -> Result<Vec<EventSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, block_number, timestamp, event_type, amount_usd
             FROM events ORDER BY timestamp DESC, id ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(EventSummary {
                id: row.get(0)?,
                block_number: row.get::<_, i64>(1)? as u64,
                timestamp: row.get(2)?,
                event_type: row.get(3)?,
                amount_usd: row.get(4)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn event_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn archived_event_count(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM events_archive", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Full event lookup by id, rebuilt from the base and detail rows.
    pub fn get_event(&self, id: &str) -> Result<Option<Event>, StoreError> {
        let base = self
            .conn
            .query_row(
                "SELECT block_number, timestamp, event_type, amount_usd
                 FROM events WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)? as u64,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                    ))
                },
            )
            .optional()?;

        let (block_number, timestamp, event_type, amount_usd) = match base {
            Some(base) => base,
            None => return Ok(None),
        };

        let kind = self.load_detail(id, &event_type)?;
        Ok(Some(Event {
            id: id.to_string(),
            block_number,
            timestamp,
            amount_usd,
            kind,
        }))
    }

    fn load_detail(&self, id: &str, event_type: &str) -> Result<EventKind, StoreError> {
        match event_type {
            "swap" => self.conn.query_row(
                "SELECT sender, recipient, token0_address, token0_symbol,
                        token1_address, token1_symbol, amount0, amount1,
                        token0_price, token1_price, liquidity
                 FROM swap_details WHERE event_id = ?1",
                params![id],
                |row| {
                    let pool = match (
                        row.get::<_, Option<f64>>(8)?,
                        row.get::<_, Option<f64>>(9)?,
                        row.get::<_, Option<f64>>(10)?,
                    ) {
                        (Some(p0), Some(p1), Some(liq)) => Some(PoolContext {
                            token0_price: p0,
                            token1_price: p1,
                            liquidity: liq,
                        }),
                        _ => None,
                    };
                    Ok(EventKind::Swap {
                        sender: row.get(0)?,
                        recipient: row.get(1)?,
                        token0: TokenRef::new(
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ),
                        token1: TokenRef::new(
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                        ),
                        amount0: row.get(6)?,
                        amount1: row.get(7)?,
                        pool,
                    })
                },
            )
            .map_err(StoreError::from),
            "mint" | "burn" => {
                let table = if event_type == "mint" {
                    "mint_details"
                } else {
                    "burn_details"
                };
                let is_mint = event_type == "mint";
                self.conn
                    .query_row(
                        &format!(
                            "SELECT sender, pool_id, token0_address, token0_symbol,
                                    token1_address, token1_symbol, amount0, amount1
                             FROM {table} WHERE event_id = ?1",
                            table = table
                        ),
                        params![id],
                        |row| {
                            let sender = row.get(0)?;
                            let pool_id = row.get(1)?;
                            let token0 = TokenRef::new(
                                row.get::<_, String>(2)?,
                                row.get::<_, String>(3)?,
                            );
                            let token1 = TokenRef::new(
                                row.get::<_, String>(4)?,
                                row.get::<_, String>(5)?,
                            );
                            let amount0 = row.get(6)?;
                            let amount1 = row.get(7)?;
                            Ok(if is_mint {
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
                            })
                        },
                    )
                    .map_err(StoreError::from)
            }
            "flashloan" => self
                .conn
                .query_row(
                    "SELECT initiator, token_address, token_symbol, amount, fee
                     FROM flashloan_details WHERE event_id = ?1",
                    params![id],
                    |row| {
                        Ok(EventKind::Flashloan {
                            initiator: row.get(0)?,
                            token: TokenRef::new(
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                            ),
                            amount: row.get(3)?,
                            fee: row.get(4)?,
                        })
                    },
                )
                .map_err(StoreError::from),
            other => Err(StoreError::Constraint {
                id: id.to_string(),
                reason: format!("unknown event_type `{}`", other),
            }),
        }
    }
}

const DETAIL_TABLES: [(&str, &str); 4] = [
    ("swap_details", "swap_details_archive"),
    ("mint_details", "mint_details_archive"),
    ("burn_details", "burn_details_archive"),
    ("flashloan_details", "flashloan_details_archive"),
];

fn apply_program_call(tx: &Transaction<'_>, call: &ProgramCall) -> Result<(), rusqlite::Error> {
    tx.execute(
        "INSERT INTO programs (program_id, venue, total_calls, first_seen, last_seen)
         VALUES (?1, ?2, 1, ?3, ?3)
         ON CONFLICT(program_id) DO UPDATE SET
             total_calls = total_calls + 1,
             first_seen = MIN(first_seen, excluded.first_seen),
             last_seen = MAX(last_seen, excluded.last_seen),
             venue = COALESCE(venue, excluded.venue)",
        params![call.program_id, call.venue, call.timestamp],
    )?;

    if let Some(instruction) = &call.instruction {
        tx.execute(
            "INSERT INTO program_instructions (program_id, instruction, calls)
             VALUES (?1, ?2, 1)
             ON CONFLICT(program_id, instruction) DO UPDATE SET
                 calls = calls + 1",
            params![call.program_id, instruction],
        )?;
    }
    Ok(())
}

/// Returns `true` when the event was newly inserted, `false` on a
/// duplicate id. Constraint failures bubble up for the savepoint to undo.
fn insert_event(tx: &Transaction<'_>, event: &Event) -> Result<bool, rusqlite::Error> {
    let changed = tx.execute(
        "INSERT OR IGNORE INTO events (id, block_number, timestamp, event_type, amount_usd)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.id,
            event.block_number as i64,
            event.timestamp,
            event.event_type(),
            event.amount_usd,
        ],
    )?;
    if changed == 0 {
        return Ok(false);
    }

    match &event.kind {
        EventKind::Swap {
            sender,
            recipient,
            token0,
            token1,
            amount0,
            amount1,
            pool,
        } => {
            tx.execute(
                "INSERT INTO swap_details
                 (event_id, sender, recipient, token0_address, token0_symbol,
                  token1_address, token1_symbol, amount0, amount1,
                  token0_price, token1_price, liquidity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    event.id,
                    sender,
                    recipient,
                    token0.address,
                    token0.symbol,
                    token1.address,
                    token1.symbol,
                    amount0,
                    amount1,
                    pool.as_ref().map(|p| p.token0_price),
                    pool.as_ref().map(|p| p.token1_price),
                    pool.as_ref().map(|p| p.liquidity),
                ],
            )?;
        }
        EventKind::Mint {
            sender,
            pool_id,
            token0,
            token1,
            amount0,
            amount1,
        }
        | EventKind::Burn {
            sender,
            pool_id,
            token0,
            token1,
            amount0,
            amount1,
        } => {
            let table = if matches!(event.kind, EventKind::Mint { .. }) {
                "mint_details"
            } else {
                "burn_details"
            };
            tx.execute(
                &format!(
                    "INSERT INTO {table}
                     (event_id, sender, pool_id, token0_address, token0_symbol,
                      token1_address, token1_symbol, amount0, amount1)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    table = table
                ),
                params![
                    event.id,
                    sender,
                    pool_id,
                    token0.address,
                    token0.symbol,
                    token1.address,
                    token1.symbol,
                    amount0,
                    amount1,
                ],
            )?;
        }
        EventKind::Flashloan {
            initiator,
            token,
            amount,
            fee,
        } => {
            tx.execute(
                "INSERT INTO flashloan_details
                 (event_id, initiator, token_address, token_symbol, amount, fee)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![event.id, initiator, token.address, token.symbol, amount, fee],
            )?;
        }
    }

    Ok(true)
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    block_number INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    amount_usd REAL
);
CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type, timestamp);

CREATE TABLE IF NOT EXISTS swap_details (
    event_id TEXT PRIMARY KEY REFERENCES events(id),
    sender TEXT NOT NULL,
    recipient TEXT NOT NULL,
    token0_address TEXT NOT NULL,
    token0_symbol TEXT NOT NULL,
    token1_address TEXT NOT NULL,
    token1_symbol TEXT NOT NULL,
    amount0 REAL NOT NULL,
    amount1 REAL NOT NULL,
    token0_price REAL,
    token1_price REAL,
    liquidity REAL
);

CREATE TABLE IF NOT EXISTS mint_details (
    event_id TEXT PRIMARY KEY REFERENCES events(id),
    sender TEXT NOT NULL,
    pool_id TEXT NOT NULL,
    token0_address TEXT NOT NULL,
    token0_symbol TEXT NOT NULL,
    token1_address TEXT NOT NULL,
    token1_symbol TEXT NOT NULL,
    amount0 REAL NOT NULL,
    amount1 REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS burn_details (
    event_id TEXT PRIMARY KEY REFERENCES events(id),
    sender TEXT NOT NULL,
    pool_id TEXT NOT NULL,
    token0_address TEXT NOT NULL,
    token0_symbol TEXT NOT NULL,
    token1_address TEXT NOT NULL,
    token1_symbol TEXT NOT NULL,
    amount0 REAL NOT NULL,
    amount1 REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS flashloan_details (
    event_id TEXT PRIMARY KEY REFERENCES events(id),
    initiator TEXT NOT NULL,
    token_address TEXT NOT NULL,
    token_symbol TEXT NOT NULL,
    amount REAL NOT NULL,
    fee REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS events_archive (
    id TEXT PRIMARY KEY,
    block_number INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    amount_usd REAL
);

CREATE TABLE IF NOT EXISTS swap_details_archive (
    event_id TEXT PRIMARY KEY,
    sender TEXT NOT NULL,
    recipient TEXT NOT NULL,
    token0_address TEXT NOT NULL,
    token0_symbol TEXT NOT NULL,
    token1_address TEXT NOT NULL,
    token1_symbol TEXT NOT NULL,
    amount0 REAL NOT NULL,
    amount1 REAL NOT NULL,
    token0_price REAL,
    token1_price REAL,
    liquidity REAL
);

CREATE TABLE IF NOT EXISTS mint_details_archive (
    event_id TEXT PRIMARY KEY,
    sender TEXT NOT NULL,
    pool_id TEXT NOT NULL,
    token0_address TEXT NOT NULL,
    token0_symbol TEXT NOT NULL,
    token1_address TEXT NOT NULL,
    token1_symbol TEXT NOT NULL,
    amount0 REAL NOT NULL,
    amount1 REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS burn_details_archive (
    event_id TEXT PRIMARY KEY,
    sender TEXT NOT NULL,
    pool_id TEXT NOT NULL,
    token0_address TEXT NOT NULL,
    token0_symbol TEXT NOT NULL,
    token1_address TEXT NOT NULL,
    token1_symbol TEXT NOT NULL,
    amount0 REAL NOT NULL,
    amount1 REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS flashloan_details_archive (
    event_id TEXT PRIMARY KEY,
    initiator TEXT NOT NULL,
    token_address TEXT NOT NULL,
    token_symbol TEXT NOT NULL,
    amount REAL NOT NULL,
    fee REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS programs (
    program_id TEXT PRIMARY KEY,
    venue TEXT,
    total_calls INTEGER NOT NULL DEFAULT 0,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS program_instructions (
    program_id TEXT NOT NULL,
    instruction TEXT NOT NULL,
    calls INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (program_id, instruction)
);

CREATE TABLE IF NOT EXISTS blocks_seen (
    slot INTEGER PRIMARY KEY
);
";
