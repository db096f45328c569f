/// Append-only log of request outcomes shared by all virtual users.
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const DEFAULT_SHARDS: usize = 64;

/// Result of a single request step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestOutcome {
    /// Virtual user that issued the request
    pub vu: u64,
    /// Iteration number within that virtual user
    pub iteration: u64,
    /// Step name, e.g. `create_team`
    pub step: String,
    /// Human-readable check label, e.g. `team created`
    pub check: String,
    /// Status code, absent when no response was received
    pub status: Option<u16>,
    /// Whether the request was issued; false when it could not be built
    pub sent: bool,
    /// Observed latency
    #[serde(serialize_with = "serialize_millis")]
    pub latency: Duration,
    /// Whether the step's expected-status predicate held
    pub success: bool,
    /// Failure detail, if any
    pub error: Option<String>,
}

impl RequestOutcome {
    /// Latency in milliseconds as a float.
    pub fn latency_ms(&self) -> f64 {
        millis(&self.latency)
    }
}

fn millis(value: &Duration) -> f64 {
    value.as_nanos() as f64 / 1_000_000.0
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(millis(value))
}

/// Thread-safe outcome recorder.
///
/// Outcomes land in one of several independently locked shards chosen by
/// virtual-user id, so users only contend with the few others hashed to the
/// same shard. Nothing is ever mutated or removed after being recorded.
pub struct OutcomeRecorder {
    shards: Box<[Mutex<Vec<RequestOutcome>>]>,
    total: AtomicU64,
    failed: AtomicU64,
}

impl OutcomeRecorder {
    /// Create a recorder with the default shard count.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Create a recorder with an explicit shard count (at least one).
    pub fn with_shards(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(Vec::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            total: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Append an outcome.
    pub fn record(&self, outcome: RequestOutcome) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if !outcome.success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        let shard = (outcome.vu % self.shards.len() as u64) as usize;
        self.shards[shard].lock().push(outcome);
    }

    /// Number of outcomes recorded so far.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Number of failed outcomes recorded so far.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Copy of every outcome recorded so far, merged across shards.
    ///
    /// Order is unspecified; aggregation never depends on it.
    pub fn snapshot(&self) -> Vec<RequestOutcome> {
        let mut merged = Vec::with_capacity(self.total() as usize);
        for shard in self.shards.iter() {
            merged.extend(shard.lock().iter().cloned());
        }
        merged
    }
}

impl Default for OutcomeRecorder {
    fn default() -> Self {
        Self::new()
    }
}
