/// Pass/fail gating of a run on latency and reliability statistics.
pub mod evaluator;
pub mod expr;
pub mod metrics;

pub use evaluator::{Threshold, ThresholdResult, ThresholdSet, Verdict};
pub use expr::{Aggregation, Operator, ThresholdExpr};
pub use metrics::{percentile, MetricKind, MetricName, MetricSelector};
