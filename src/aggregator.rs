//! In-memory program usage aggregation
//!
//! Counts program invocations observed by the pipeline and answers
//! "most used programs" queries with a utility-program denylist applied.
//! Ties on call count break toward the program seen earlier; among
//! programs first seen at the same timestamp, insertion order decides, so
//! rankings are stable across runs over the same input.

use std::collections::{HashMap, HashSet};

/// Per-program usage statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramUsage {
    pub program_id: String,
    pub total_calls: u64,
    /// Timestamp of the earliest recorded invocation.
    pub first_seen: i64,
    pub last_seen: i64,
    /// Distinct instruction labels, with per-label counts.
    pub instructions: HashMap<String, u64>,
    seq: u64,
}

impl ProgramUsage {
    fn new(program_id: String, timestamp: i64, seq: u64) -> Self {
        Self {
            program_id,
            total_calls: 0,
            first_seen: timestamp,
            last_seen: timestamp,
            instructions: HashMap::new(),
            seq,
        }
    }

    /// Rebuild a usage record from durable counters.
    pub fn restored(
        program_id: String,
        total_calls: u64,
        first_seen: i64,
        last_seen: i64,
        instructions: HashMap<String, u64>,
    ) -> Self {
        Self {
            program_id,
            total_calls,
            first_seen,
            last_seen,
            instructions,
            seq: 0,
        }
    }
}

/// Aggregate counters over everything the pipeline has processed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageSnapshot {
    pub programs_tracked: usize,
    pub calls_recorded: u64,
    pub calls_with_instruction: u64,
}

pub struct UsageAggregator {
    programs: HashMap<String, ProgramUsage>,
    denylist: HashSet<String>,
    calls_recorded: u64,
    calls_with_instruction: u64,
    next_seq: u64,
}

impl UsageAggregator {
    /// Aggregator with the built-in utility denylist: plumbing programs
    /// that appear in nearly every transaction and would drown out real
    /// usage rankings.
    pub fn new() -> Self {
        let denylist = [
            "ComputeBudget111111111111111111111111111111",
            "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr",
            "11111111111111111111111111111111",
            "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
            "Vote111111111111111111111111111111111111111",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self::with_denylist(denylist)
    }

    pub fn with_denylist(denylist: HashSet<String>) -> Self {
        Self {
            programs: HashMap::new(),
            denylist,
            calls_recorded: 0,
            calls_with_instruction: 0,
            next_seq: 0,
        }
    }

    /// Record one invocation. Denylisted programs are still counted; the
    /// denylist only filters ranking output.
    pub fn record(&mut self, program_id: &str, timestamp: i64, instruction: Option<&str>) {
        if !self.programs.contains_key(program_id) {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.programs.insert(
                program_id.to_string(),
                ProgramUsage::new(program_id.to_string(), timestamp, seq),
            );
        }
        let usage = match self.programs.get_mut(program_id) {
            Some(usage) => usage,
            None => return,
        };

        usage.total_calls += 1;
        usage.first_seen = usage.first_seen.min(timestamp);
        usage.last_seen = usage.last_seen.max(timestamp);

        self.calls_recorded += 1;
        if let Some(label) = instruction {
            *usage.instructions.entry(label.to_string()).or_insert(0) += 1;
            self.calls_with_instruction += 1;
        }
    }

    /// Seed the aggregator from counters restored out of durable storage.
    /// Insertion-order tie-breaks follow the order of `usage`.
    pub fn seed(&mut self, usage: Vec<ProgramUsage>) {
        for mut restored in usage {
            restored.seq = self.next_seq;
            self.next_seq += 1;
            self.calls_recorded += restored.total_calls;
            self.calls_with_instruction += restored.instructions.values().sum::<u64>();
            self.programs.insert(restored.program_id.clone(), restored);
        }
    }

    pub fn usage(&self, program_id: &str) -> Option<&ProgramUsage> {
        self.programs.get(program_id)
    }

    /// The `n` most-invoked programs, denylist excluded. Ordered by call
    /// count descending, then earliest `first_seen`, then first-recorded.
    pub fn top_programs(&self, n: usize) -> Vec<ProgramUsage> {
        let mut ranked: Vec<ProgramUsage> = self
            .programs
            .values()
            .filter(|u| !self.denylist.contains(&u.program_id))
            .cloned()
            .collect();

        ranked.sort_by(|a, b| {
            b.total_calls
                .cmp(&a.total_calls)
                .then(a.first_seen.cmp(&b.first_seen))
                .then(a.seq.cmp(&b.seq))
        });
        ranked.truncate(n);
        ranked
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            programs_tracked: self.programs.len(),
            calls_recorded: self.calls_recorded,
            calls_with_instruction: self.calls_with_instruction,
        }
    }
}

impl Default for UsageAggregator {
    fn default() -> Self {
        Self::new()
    }
}
