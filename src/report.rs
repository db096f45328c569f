/// End-of-run report handed to the output formatters.
use crate::recorder::RequestOutcome;
use crate::scheduler::SchedulerReport;
use crate::thresholds::{percentile, Verdict};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Process exit code when the run completed but thresholds failed.
pub const THRESHOLDS_FAILED_EXIT_CODE: i32 = 99;

/// Latency distribution in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendSummary {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub max: f64,
    // percentile keys follow the threshold grammar, e.g. `p(99.9)`
    #[serde(rename = "p(90)")]
    pub p90: f64,
    #[serde(rename = "p(95)")]
    pub p95: f64,
    #[serde(rename = "p(99)")]
    pub p99: f64,
    #[serde(rename = "p(99.9)")]
    pub p99_9: f64,
}

impl TrendSummary {
    pub fn from_latencies(mut values: Vec<f64>) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        values.sort_by(f64::total_cmp);
        let at = |p: f64| percentile(&values, p).unwrap_or_default();
        Self {
            count: values.len(),
            avg: values.iter().sum::<f64>() / values.len() as f64,
            min: values[0],
            med: at(50.0),
            max: values[values.len() - 1],
            p90: at(90.0),
            p95: at(95.0),
            p99: at(99.0),
            p99_9: at(99.9),
        }
    }
}

/// Pass counts of one check.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckSummary {
    pub check: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn rate(&self) -> f64 {
        let total = self.passes + self.fails;
        if total == 0 {
            0.0
        } else {
            self.passes as f64 / total as f64
        }
    }
}

/// Built-in metric values over the whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub http_reqs: u64,
    /// Requests per second over the run
    pub http_reqs_rate: f64,
    /// Fraction of failed requests
    pub http_req_failed: f64,
    /// Fraction of passed checks
    pub checks: f64,
    pub http_req_duration: TrendSummary,
    /// Per-step check results, keyed by step name
    pub steps: BTreeMap<String, CheckSummary>,
}

impl MetricsSummary {
    pub fn from_outcomes(outcomes: &[RequestOutcome], elapsed: Duration) -> Self {
        let total = outcomes.len() as u64;
        let failed = outcomes.iter().filter(|o| !o.success).count() as u64;

        let mut steps: BTreeMap<String, CheckSummary> = BTreeMap::new();
        for outcome in outcomes {
            let entry = steps
                .entry(outcome.step.clone())
                .or_insert_with(|| CheckSummary {
                    check: outcome.check.clone(),
                    ..CheckSummary::default()
                });
            if outcome.success {
                entry.passes += 1;
            } else {
                entry.fails += 1;
            }
        }

        let latencies = outcomes
            .iter()
            .filter(|o| o.sent)
            .map(RequestOutcome::latency_ms)
            .collect();

        let ratio = |n: u64| if total == 0 { 0.0 } else { n as f64 / total as f64 };
        Self {
            http_reqs: total,
            http_reqs_rate: if elapsed.is_zero() {
                0.0
            } else {
                total as f64 / elapsed.as_secs_f64()
            },
            http_req_failed: ratio(failed),
            checks: ratio(total - failed),
            http_req_duration: TrendSummary::from_latencies(latencies),
            steps,
        }
    }
}

/// Everything known about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub target: String,
    pub elapsed_secs: f64,
    /// Stopped early by the operator or a threshold breach
    pub interrupted: bool,
    pub aborted_by_threshold: bool,
    pub scheduler: SchedulerReport,
    pub metrics: MetricsSummary,
    pub verdict: Verdict,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.verdict.passed
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            THRESHOLDS_FAILED_EXIT_CODE
        }
    }
}
