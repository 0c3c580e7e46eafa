//! Poll loop state machine
//!
//! One poller drives one upstream source through repeating cycles:
//! IDLE -> FETCHING -> PROCESSING -> PERSISTING -> WAITING, with STOPPED
//! reachable from anywhere via the shutdown channel. The cursor only
//! advances after a cycle's output is durably persisted, so a crash or an
//! abandoned cycle replays the same input - and the idempotent store makes
//! that replay harmless.

use crate::aggregator::UsageAggregator;
use crate::backoff::Backoff;
use crate::classifier::{Classifier, Label};
use crate::config::Config;
use crate::error::SourceError;
use crate::event::Event;
use crate::normalizer;
use crate::source::{BlockSource, PageSource, RawActivityPage};
use crate::store::{EventStore, ProgramCall};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Fetching,
    Processing,
    Persisting,
    Waiting,
    Stopped,
}

/// Where the next cycle resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Next block slot to fetch.
    Slot(u64),
    /// Current half-open query window and pagination offset within it.
    Window { start_ts: i64, end_ts: i64, skip: usize },
}

/// What one cycle accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// New input was processed and the cursor advanced.
    Progress,
    /// The source had nothing new; the cursor may still advance (empty
    /// page closing a window, skipped slot).
    Empty,
    /// Retries were exhausted; the cursor did not move.
    Abandoned,
}

enum Driver {
    Block(Arc<dyn BlockSource>),
    Window(Arc<dyn PageSource>),
}

#[derive(Debug, Clone)]
pub struct PollerOptions {
    pub poll_interval_secs: u64,
    pub window_secs: i64,
    /// A window is only queried once its end is at least this far in the
    /// past, so the indexer has finished publishing into it.
    pub lag_buffer_secs: i64,
    pub max_retries: u32,
    pub backoff_initial_secs: u64,
    pub backoff_max_secs: u64,
}

impl PollerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval_secs: config.poll_interval_secs,
            window_secs: config.window_secs,
            lag_buffer_secs: config.lag_buffer_secs,
            max_retries: config.max_retries,
            backoff_initial_secs: config.backoff_initial_secs,
            backoff_max_secs: config.backoff_max_secs,
        }
    }
}

pub struct Poller {
    driver: Driver,
    store: Arc<Mutex<EventStore>>,
    classifier: Arc<Classifier>,
    aggregator: Arc<Mutex<UsageAggregator>>,
    cursor: Cursor,
    state: PollerState,
    options: PollerOptions,
    /// Highest slot the provider reported, refreshed when the cursor
    /// catches up to it. Block driver only.
    known_tip: u64,
    /// Most recent chain timestamp observed in a fetched block; stands in
    /// when a block carries no time of its own. Block driver only.
    last_block_time: Option<i64>,
}

impl Poller {
    pub fn new_window(
        source: Arc<dyn PageSource>,
        store: Arc<Mutex<EventStore>>,
        classifier: Arc<Classifier>,
        aggregator: Arc<Mutex<UsageAggregator>>,
        start_ts: i64,
        options: PollerOptions,
    ) -> Self {
        let cursor = Cursor::Window {
            start_ts,
            end_ts: start_ts + options.window_secs,
            skip: 0,
        };
        Self {
            driver: Driver::Window(source),
            store,
            classifier,
            aggregator,
            cursor,
            state: PollerState::Idle,
            options,
            known_tip: 0,
            last_block_time: None,
        }
    }

    pub fn new_block(
        source: Arc<dyn BlockSource>,
        store: Arc<Mutex<EventStore>>,
        classifier: Arc<Classifier>,
        aggregator: Arc<Mutex<UsageAggregator>>,
        start_slot: u64,
        options: PollerOptions,
    ) -> Self {
        Self {
            driver: Driver::Block(source),
            store,
            classifier,
            aggregator,
            cursor: Cursor::Slot(start_slot),
            state: PollerState::Idle,
            options,
            known_tip: 0,
            last_block_time: None,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Run cycles until the shutdown channel flips to `true`. The flag is
    /// checked between cycles; an in-flight cycle always runs to completion
    /// so a persisted batch is never abandoned halfway.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = self.run_cycle().await;

            if outcome == CycleOutcome::Abandoned {
                log::warn!("Cycle abandoned; cursor unchanged at {:?}", self.cursor);
            }

            self.state = PollerState::Waiting;
            tokio::select! {
                _ = sleep(Duration::from_secs(self.options.poll_interval_secs)) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.state = PollerState::Stopped;
        log::info!("🛑 Poller stopped at cursor {:?}", self.cursor);
    }

    /// One full cycle against the configured source.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        match &self.driver {
            Driver::Window(source) => {
                let source = Arc::clone(source);
                self.window_cycle(source).await
            }
            Driver::Block(source) => {
                let source = Arc::clone(source);
                self.block_cycle(source).await
            }
        }
    }

    // -- windowed (paginated) driver ----------------------------------------

    async fn window_cycle(&mut self, source: Arc<dyn PageSource>) -> CycleOutcome {
        let (start_ts, end_ts, skip) = match self.cursor {
            Cursor::Window { start_ts, end_ts, skip } => (start_ts, end_ts, skip),
            Cursor::Slot(_) => return CycleOutcome::Abandoned,
        };

        // Hold off until the indexer has settled past the window's end.
        // Querying earlier risks a short page that looks final while more
        // records are still being published into offsets already passed.
        let now = chrono::Utc::now().timestamp();
        if end_ts + self.options.lag_buffer_secs > now {
            log::debug!(
                "Window [{}, {}) inside the indexing lag horizon, waiting",
                start_ts,
                end_ts
            );
            return CycleOutcome::Empty;
        }

        self.state = PollerState::Fetching;
        let page = match self
            .fetch_with_backoff(|| {
                let source = Arc::clone(&source);
                async move { source.fetch_page(start_ts, end_ts, skip).await }
            })
            .await
        {
            Ok(page) => page,
            Err(e) => {
                log::error!("Window fetch failed after retries: {}", e);
                return CycleOutcome::Abandoned;
            }
        };

        if page.is_empty() {
            // Empty page terminates pagination for this settled window.
            self.cursor = Cursor::Window {
                start_ts: end_ts,
                end_ts: end_ts + self.options.window_secs,
                skip: 0,
            };
            log::debug!("Window [{}, {}) complete", start_ts, end_ts);
            return CycleOutcome::Empty;
        }

        self.state = PollerState::Processing;
        let (events, malformed) = normalize_page(&page);
        if malformed > 0 {
            log::warn!(
                "Window [{}, {}) skip={}: {} malformed records skipped",
                start_ts,
                end_ts,
                skip,
                malformed
            );
        }

        self.state = PollerState::Persisting;
        if !self.persist_events(&events).await {
            return CycleOutcome::Abandoned;
        }

        // The offset advances by what the largest collection actually
        // returned, so a short page resumes exactly where it ended. Every
        // page with records gets a follow-up fetch at the next offset; the
        // confirming empty page is what closes the window.
        self.cursor = Cursor::Window {
            start_ts,
            end_ts,
            skip: skip + page.max_collection_len(),
        };
        CycleOutcome::Progress
    }

    /// Upsert, attribute, and log one batch. Event rows and usage counters
    /// commit in one store transaction, so a counter can never be lost
    /// while its event lands (or the other way round). Returns `false`
    /// when the store stayed unavailable after one retry.
    async fn persist_events(&mut self, events: &[Event]) -> bool {
        let calls: Vec<ProgramCall> = events
            .iter()
            .map(|event| {
                let origin = event.origin();
                ProgramCall {
                    program_id: origin.to_string(),
                    venue: self.classifier.venue_name(origin).map(String::from),
                    timestamp: event.timestamp,
                    instruction: Some(event.event_type().to_string()),
                }
            })
            .collect();

        let mut store = self.store.lock().await;
        let report = match store.upsert_batch_attributed(events, &calls) {
            Ok(report) => report,
            Err(first) => {
                log::warn!("Upsert failed, retrying once: {}", first);
                match store.upsert_batch_attributed(events, &calls) {
                    Ok(report) => report,
                    Err(e) => {
                        log::error!("Upsert failed twice, abandoning cycle: {}", e);
                        return false;
                    }
                }
            }
        };
        drop(store);

        // Only newly inserted events feed the in-memory counters; replays
        // of ids the store already holds change nothing.
        let inserted: Vec<&Event> = report
            .inserted
            .iter()
            .filter_map(|id| events.iter().find(|e| &e.id == id))
            .collect();

        let mut label_summary: BTreeSet<Label> = BTreeSet::new();
        {
            let mut aggregator = self.aggregator.lock().await;
            for event in &inserted {
                let labels = self.classifier.classify(event);
                label_summary.extend(labels.iter().cloned());
                aggregator.record(event.origin(), event.timestamp, Some(event.event_type()));
            }
        }

        if !inserted.is_empty() {
            let labels: Vec<String> = label_summary.iter().map(|l| l.describe()).collect();
            log::info!(
                "📥 Persisted {} events ({} duplicate, {} skipped), labels: [{}]",
                inserted.len(),
                report.duplicates,
                report.skipped,
                labels.join(", ")
            );
        }
        true
    }

    // -- block driver --------------------------------------------------------

    async fn block_cycle(&mut self, source: Arc<dyn BlockSource>) -> CycleOutcome {
        let slot = match self.cursor {
            Cursor::Slot(slot) => slot,
            Cursor::Window { .. } => return CycleOutcome::Abandoned,
        };

        self.state = PollerState::Fetching;

        if slot > self.known_tip {
            let tip_source = Arc::clone(&source);
            self.known_tip = match self
                .fetch_with_backoff(move || {
                    let source = Arc::clone(&tip_source);
                    async move { source.latest_slot().await }
                })
                .await
            {
                Ok(tip) => tip,
                Err(e) => {
                    log::error!("Tip fetch failed after retries: {}", e);
                    return CycleOutcome::Abandoned;
                }
            };
            if slot > self.known_tip {
                return CycleOutcome::Empty;
            }
        }

        let block = match self
            .fetch_with_backoff(|| {
                let source = Arc::clone(&source);
                async move { source.fetch_block(slot).await }
            })
            .await
        {
            Ok(block) => block,
            Err(e) => {
                log::error!("Block fetch failed after retries: {}", e);
                return CycleOutcome::Abandoned;
            }
        };

        let block = match block {
            Some(block) => block,
            None => {
                // Skipped slot: nothing will ever appear here.
                self.cursor = Cursor::Slot(slot + 1);
                return CycleOutcome::Empty;
            }
        };

        self.state = PollerState::Processing;
        let timestamp = match block.block_time {
            Some(block_time) => {
                self.last_block_time = Some(block_time);
                block_time
            }
            // Never substitute wall-clock time for a historical slot; the
            // last observed chain time keeps first/last_seen honest. Until
            // one exists there is nothing truthful to record against.
            None => match self.last_block_time {
                Some(previous) => previous,
                None => {
                    log::warn!(
                        "Slot {} has no block time and none seen yet, usage not counted",
                        slot
                    );
                    self.cursor = Cursor::Slot(slot + 1);
                    return CycleOutcome::Empty;
                }
            },
        };

        let mut calls = Vec::new();
        let mut label_summary: BTreeSet<Label> = BTreeSet::new();
        let mut malformed = 0usize;
        for raw_tx in &block.transactions {
            let activity = match normalizer::normalize_block_transaction(raw_tx) {
                Ok(activity) => activity,
                Err(e) => {
                    log::debug!("Slot {}: {}", slot, e);
                    malformed += 1;
                    continue;
                }
            };

            let addresses = activity.account_keys.iter().map(String::as_str);
            label_summary.extend(self.classifier.classify_addresses(addresses));

            for obs in &activity.observations {
                calls.push(ProgramCall {
                    program_id: obs.program_id.clone(),
                    venue: self
                        .classifier
                        .venue_name(&obs.program_id)
                        .map(String::from),
                    timestamp,
                    instruction: obs.instruction.clone(),
                });
            }
        }

        // Slot marker and usage counters commit in one transaction: either
        // the block counts exactly once, or the cursor stays put and the
        // whole slot is retried.
        self.state = PollerState::Persisting;
        let mut store = self.store.lock().await;
        let newly_seen = match store.record_block_usage(slot, &calls) {
            Ok(newly_seen) => newly_seen,
            Err(first) => {
                log::warn!("Slot {} persist failed, retrying once: {}", slot, first);
                match store.record_block_usage(slot, &calls) {
                    Ok(newly_seen) => newly_seen,
                    Err(e) => {
                        log::error!("Slot {} persist failed twice, abandoning cycle: {}", slot, e);
                        return CycleOutcome::Abandoned;
                    }
                }
            }
        };
        drop(store);

        if !newly_seen {
            log::debug!("Slot {} already processed, skipping re-count", slot);
            self.cursor = Cursor::Slot(slot + 1);
            return CycleOutcome::Empty;
        }

        {
            let mut aggregator = self.aggregator.lock().await;
            for call in &calls {
                aggregator.record(&call.program_id, call.timestamp, call.instruction.as_deref());
            }
        }

        if malformed > 0 {
            log::warn!("Slot {}: {} malformed transactions skipped", slot, malformed);
        }
        let labels: Vec<String> = label_summary.iter().map(|l| l.describe()).collect();
        log::info!(
            "📦 Slot {}: {} transactions, {} program calls, labels: [{}]",
            slot,
            block.transactions.len(),
            calls.len(),
            labels.join(", ")
        );

        self.cursor = Cursor::Slot(slot + 1);
        CycleOutcome::Progress
    }

    // -- shared --------------------------------------------------------------

    async fn fetch_with_backoff<T, F, Fut>(&self, mut fetch: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, SourceError>>,
    {
        let mut backoff = Backoff::new(
            Duration::from_secs(self.options.backoff_initial_secs),
            Duration::from_secs(self.options.backoff_max_secs),
            self.options.max_retries,
        );

        loop {
            match fetch().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    log::warn!("Fetch failed: {}", e);
                    if !backoff.wait().await {
                        return Err(e);
                    }
                }
            }
        }
    }
}

/// Normalize every collection in a page, in source order. Malformed records
/// are counted and logged, never fatal.
fn normalize_page(page: &RawActivityPage) -> (Vec<Event>, usize) {
    let mut events = Vec::with_capacity(page.record_count());
    let mut malformed = 0usize;

    let mut push = |result: Result<Event, crate::error::NormalizeError>| match result {
        Ok(event) => events.push(event),
        Err(e) => {
            log::warn!("{}", e);
            malformed += 1;
        }
    };

    for raw in &page.swaps {
        push(normalizer::normalize_swap(raw));
    }
    for raw in &page.mints {
        push(normalizer::normalize_mint(raw));
    }
    for raw in &page.burns {
        push(normalizer::normalize_burn(raw));
    }
    for raw in &page.flash_loans {
        push(normalizer::normalize_flashloan(raw));
    }
    for raw in &page.transactions {
        for result in normalizer::normalize_graph_transaction(raw) {
            push(result);
        }
    }

    (events, malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RawBlock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn options() -> PollerOptions {
        PollerOptions {
            poll_interval_secs: 1,
            window_secs: 3600,
            lag_buffer_secs: 300,
            max_retries: 2,
            backoff_initial_secs: 1,
            backoff_max_secs: 2,
        }
    }

    fn shared_store() -> Arc<Mutex<EventStore>> {
        Arc::new(Mutex::new(EventStore::open_in_memory().unwrap()))
    }

    fn swap_json(id: &str, timestamp: i64) -> String {
        format!(
            r#"{{
                "id": "{id}",
                "timestamp": {timestamp},
                "blockNumber": 100,
                "sender": "0xa",
                "recipient": "0xb",
                "token0": {{"id": "0xt0", "symbol": "A"}},
                "token1": {{"id": "0xt1", "symbol": "B"}},
                "amount0": "1.0",
                "amount1": "-2.0",
                "amountUSD": "10.0"
            }}"#
        )
    }

    fn page_with_swaps(ids: &[(&str, i64)]) -> RawActivityPage {
        let swaps: Vec<String> = ids.iter().map(|(id, ts)| swap_json(id, *ts)).collect();
        serde_json::from_str(&format!(r#"{{"swaps": [{}]}}"#, swaps.join(","))).unwrap()
    }

    /// Scripted page source: returns pages in order, then empty pages.
    struct ScriptedPages {
        pages: Vec<Result<RawActivityPage, ()>>,
        fetches: AtomicUsize,
    }

    impl ScriptedPages {
        fn new(pages: Vec<Result<RawActivityPage, ()>>) -> Self {
            Self {
                pages,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PageSource for ScriptedPages {
        async fn fetch_page(
            &self,
            _start_ts: i64,
            _end_ts: i64,
            _skip: usize,
        ) -> Result<RawActivityPage, SourceError> {
            let index = self.fetches.fetch_add(1, Ordering::SeqCst);
            match self.pages.get(index) {
                Some(Ok(page)) => Ok(page.clone()),
                Some(Err(())) => Err(SourceError::Status(503)),
                None => Ok(RawActivityPage::default()),
            }
        }
    }

    struct ScriptedBlocks {
        blocks: Vec<Option<RawBlock>>,
        tip: u64,
    }

    #[async_trait]
    impl BlockSource for ScriptedBlocks {
        async fn fetch_block(&self, slot: u64) -> Result<Option<RawBlock>, SourceError> {
            Ok(self.blocks.get(slot as usize).cloned().flatten())
        }

        async fn latest_slot(&self) -> Result<u64, SourceError> {
            Ok(self.tip)
        }
    }

    fn poller_for_pages(
        source: Arc<dyn PageSource>,
        store: Arc<Mutex<EventStore>>,
    ) -> Poller {
        Poller::new_window(
            source,
            store,
            Arc::new(Classifier::new()),
            Arc::new(Mutex::new(UsageAggregator::new())),
            0,
            options(),
        )
    }

    #[tokio::test]
    async fn test_pagination_advances_skip_then_closes_window() {
        let pages = vec![
            Ok(page_with_swaps(&[("a", 100), ("b", 200)])),
            Ok(page_with_swaps(&[("c", 300)])),
            // Confirming empty page.
        ];
        let store = shared_store();
        let mut poller = poller_for_pages(Arc::new(ScriptedPages::new(pages)), Arc::clone(&store));

        assert_eq!(poller.run_cycle().await, CycleOutcome::Progress);
        assert_eq!(
            poller.cursor(),
            Cursor::Window { start_ts: 0, end_ts: 3600, skip: 2 }
        );

        // Short page still gets a confirming fetch before the window closes,
        // resuming exactly after the records received.
        assert_eq!(poller.run_cycle().await, CycleOutcome::Progress);
        assert_eq!(
            poller.cursor(),
            Cursor::Window { start_ts: 0, end_ts: 3600, skip: 3 }
        );

        assert_eq!(poller.run_cycle().await, CycleOutcome::Empty);
        assert_eq!(
            poller.cursor(),
            Cursor::Window { start_ts: 3600, end_ts: 7200, skip: 0 }
        );

        let store = store.lock().await;
        assert_eq!(store.event_count().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_short_page_resumes_where_it_ended() {
        // The indexer had published only 437 of 900 records when the window
        // was first queried; the rest appear on the next fetch. Resuming at
        // the received count (not the nominal page size) drains all 900.
        let first: Vec<String> = (0..437).map(|i| swap_json(&format!("s{}", i), 100)).collect();
        let late: Vec<String> = (437..900).map(|i| swap_json(&format!("s{}", i), 100)).collect();
        let pages = vec![
            Ok(serde_json::from_str(&format!(r#"{{"swaps": [{}]}}"#, first.join(","))).unwrap()),
            Ok(serde_json::from_str(&format!(r#"{{"swaps": [{}]}}"#, late.join(","))).unwrap()),
        ];
        let store = shared_store();
        let mut poller = poller_for_pages(Arc::new(ScriptedPages::new(pages)), Arc::clone(&store));

        assert_eq!(poller.run_cycle().await, CycleOutcome::Progress);
        assert_eq!(
            poller.cursor(),
            Cursor::Window { start_ts: 0, end_ts: 3600, skip: 437 }
        );
        assert_eq!(poller.run_cycle().await, CycleOutcome::Progress);
        assert_eq!(
            poller.cursor(),
            Cursor::Window { start_ts: 0, end_ts: 3600, skip: 900 }
        );
        assert_eq!(poller.run_cycle().await, CycleOutcome::Empty);

        assert_eq!(store.lock().await.event_count().unwrap(), 900);
    }

    #[tokio::test]
    async fn test_window_inside_lag_horizon_is_not_queried() {
        let now = chrono::Utc::now().timestamp();
        let source = Arc::new(ScriptedPages::new(vec![Ok(page_with_swaps(&[("a", now)]))]));
        let store = shared_store();
        let mut poller = Poller::new_window(
            Arc::clone(&source) as Arc<dyn PageSource>,
            Arc::clone(&store),
            Arc::new(Classifier::new()),
            Arc::new(Mutex::new(UsageAggregator::new())),
            now - 3600,
            options(),
        );

        // The window ends right now; with a 300s lag buffer it must not be
        // fetched yet, and the cursor must not move.
        assert_eq!(poller.run_cycle().await, CycleOutcome::Empty);
        assert_eq!(
            poller.cursor(),
            Cursor::Window { start_ts: now - 3600, end_ts: now, skip: 0 }
        );
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(store.lock().await.event_count().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_leaves_cursor_unchanged() {
        let pages = vec![Err(()), Err(()), Err(())];
        let store = shared_store();
        let mut poller = poller_for_pages(Arc::new(ScriptedPages::new(pages)), Arc::clone(&store));

        assert_eq!(poller.run_cycle().await, CycleOutcome::Abandoned);
        assert_eq!(
            poller.cursor(),
            Cursor::Window { start_ts: 0, end_ts: 3600, skip: 0 }
        );
        assert_eq!(store.lock().await.event_count().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retries_within_cycle() {
        let pages = vec![Err(()), Ok(page_with_swaps(&[("a", 100)]))];
        let store = shared_store();
        let mut poller = poller_for_pages(Arc::new(ScriptedPages::new(pages)), Arc::clone(&store));

        assert_eq!(poller.run_cycle().await, CycleOutcome::Progress);
        assert_eq!(store.lock().await.event_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replayed_window_does_not_double_count() {
        let page = page_with_swaps(&[("a", 100), ("b", 200)]);
        let store = shared_store();
        let aggregator = Arc::new(Mutex::new(UsageAggregator::new()));

        for _ in 0..2 {
            let mut poller = Poller::new_window(
                Arc::new(ScriptedPages::new(vec![Ok(page.clone())])),
                Arc::clone(&store),
                Arc::new(Classifier::new()),
                Arc::clone(&aggregator),
                0,
                options(),
            );
            assert_eq!(poller.run_cycle().await, CycleOutcome::Progress);
        }

        assert_eq!(store.lock().await.event_count().unwrap(), 2);
        // Second pass saw only duplicates, so usage stayed flat.
        assert_eq!(aggregator.lock().await.snapshot().calls_recorded, 2);
        // Durable counters moved with the rows, inside the same transaction.
        let store = store.lock().await;
        assert_eq!(store.top_programs(10).unwrap()[0].total_calls, 2);
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped_not_fatal() {
        let json = format!(
            r#"{{"swaps": [{}, {{"id": "broken"}}]}}"#,
            swap_json("good", 100)
        );
        let page: RawActivityPage = serde_json::from_str(&json).unwrap();
        let store = shared_store();
        let mut poller =
            poller_for_pages(Arc::new(ScriptedPages::new(vec![Ok(page)])), Arc::clone(&store));

        assert_eq!(poller.run_cycle().await, CycleOutcome::Progress);
        let store = store.lock().await;
        assert_eq!(store.event_count().unwrap(), 1);
        assert!(store.get_event("good").unwrap().is_some());
    }

    fn block_with_program(program_id: &str) -> RawBlock {
        let json = format!(
            r#"{{
                "blockTime": 1700000000,
                "transactions": [{{
                    "transaction": {{
                        "signatures": ["sig1"],
                        "message": {{
                            "accountKeys": ["payer", "{program_id}"],
                            "instructions": [{{"programId": "{program_id}", "parsed": "swap"}}]
                        }}
                    }},
                    "meta": {{"logMessages": []}}
                }}]
            }}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    #[tokio::test]
    async fn test_block_cycle_records_program_usage() {
        let source = Arc::new(ScriptedBlocks {
            blocks: vec![Some(block_with_program("prog_x"))],
            tip: 0,
        });
        let store = shared_store();
        let aggregator = Arc::new(Mutex::new(UsageAggregator::new()));
        let mut poller = Poller::new_block(
            source,
            Arc::clone(&store),
            Arc::new(Classifier::new()),
            Arc::clone(&aggregator),
            0,
            options(),
        );

        assert_eq!(poller.run_cycle().await, CycleOutcome::Progress);
        assert_eq!(poller.cursor(), Cursor::Slot(1));

        let aggregator = aggregator.lock().await;
        let usage = aggregator.usage("prog_x").unwrap();
        assert_eq!(usage.total_calls, 1);
        assert_eq!(usage.instructions.get("swap"), Some(&1));
    }

    #[tokio::test]
    async fn test_replayed_slot_is_not_recounted() {
        let block = block_with_program("prog_x");
        let store = shared_store();
        let aggregator = Arc::new(Mutex::new(UsageAggregator::new()));

        for _ in 0..2 {
            let mut poller = Poller::new_block(
                Arc::new(ScriptedBlocks {
                    blocks: vec![Some(block.clone())],
                    tip: 0,
                }),
                Arc::clone(&store),
                Arc::new(Classifier::new()),
                Arc::clone(&aggregator),
                0,
                options(),
            );
            poller.run_cycle().await;
        }

        assert_eq!(aggregator.lock().await.snapshot().calls_recorded, 1);
        let store = store.lock().await;
        let top = store.top_programs(10).unwrap();
        assert_eq!(top[0].total_calls, 1);
    }

    fn block_without_time(program_id: &str) -> RawBlock {
        let json = format!(
            r#"{{
                "transactions": [{{
                    "transaction": {{
                        "signatures": ["sig1"],
                        "message": {{
                            "accountKeys": ["payer", "{program_id}"],
                            "instructions": [{{"programId": "{program_id}", "parsed": "swap"}}]
                        }}
                    }},
                    "meta": {{"logMessages": []}}
                }}]
            }}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    #[tokio::test]
    async fn test_block_without_time_uses_last_chain_time() {
        let source = Arc::new(ScriptedBlocks {
            blocks: vec![
                Some(block_with_program("prog_x")),
                Some(block_without_time("prog_y")),
            ],
            tip: 1,
        });
        let store = shared_store();
        let aggregator = Arc::new(Mutex::new(UsageAggregator::new()));
        let mut poller = Poller::new_block(
            source,
            Arc::clone(&store),
            Arc::new(Classifier::new()),
            Arc::clone(&aggregator),
            0,
            options(),
        );

        assert_eq!(poller.run_cycle().await, CycleOutcome::Progress);
        assert_eq!(poller.run_cycle().await, CycleOutcome::Progress);

        // The timeless block inherits the chain time of its predecessor
        // instead of a fabricated wall-clock value.
        let aggregator = aggregator.lock().await;
        let usage = aggregator.usage("prog_y").unwrap();
        assert_eq!(usage.first_seen, 1_700_000_000);
        assert_eq!(usage.last_seen, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_block_without_any_chain_time_is_not_counted() {
        let source = Arc::new(ScriptedBlocks {
            blocks: vec![Some(block_without_time("prog_y"))],
            tip: 0,
        });
        let store = shared_store();
        let aggregator = Arc::new(Mutex::new(UsageAggregator::new()));
        let mut poller = Poller::new_block(
            source,
            Arc::clone(&store),
            Arc::new(Classifier::new()),
            Arc::clone(&aggregator),
            0,
            options(),
        );

        assert_eq!(poller.run_cycle().await, CycleOutcome::Empty);
        assert_eq!(poller.cursor(), Cursor::Slot(1));
        assert!(aggregator.lock().await.usage("prog_y").is_none());
        assert!(store.lock().await.top_programs(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skipped_slot_advances_cursor() {
        let source = Arc::new(ScriptedBlocks {
            blocks: vec![None, Some(block_with_program("prog_x"))],
            tip: 1,
        });
        let store = shared_store();
        let mut poller = Poller::new_block(
            source,
            store,
            Arc::new(Classifier::new()),
            Arc::new(Mutex::new(UsageAggregator::new())),
            0,
            options(),
        );

        assert_eq!(poller.run_cycle().await, CycleOutcome::Empty);
        assert_eq!(poller.cursor(), Cursor::Slot(1));
        assert_eq!(poller.run_cycle().await, CycleOutcome::Progress);
        assert_eq!(poller.cursor(), Cursor::Slot(2));
    }

    #[tokio::test]
    async fn test_cursor_waits_at_the_tip() {
        let source = Arc::new(ScriptedBlocks { blocks: vec![], tip: 5 });
        let store = shared_store();
        let mut poller = Poller::new_block(
            source,
            store,
            Arc::new(Classifier::new()),
            Arc::new(Mutex::new(UsageAggregator::new())),
            10,
            options(),
        );

        assert_eq!(poller.run_cycle().await, CycleOutcome::Empty);
        assert_eq!(poller.cursor(), Cursor::Slot(10));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let store = shared_store();
        let mut poller = poller_for_pages(Arc::new(ScriptedPages::new(vec![])), store);

        let (tx, rx) = watch::channel(true);
        poller.run(rx).await;
        assert_eq!(poller.state(), PollerState::Stopped);
        drop(tx);
    }
}
