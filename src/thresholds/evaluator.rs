/// Evaluation of configured thresholds against the outcome log.
use crate::error::ThresholdError;
use crate::recorder::RequestOutcome;
use crate::thresholds::expr::ThresholdExpr;
use crate::thresholds::metrics::MetricSelector;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// One selector and the expressions it must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    /// Selector as written in the configuration
    pub key: String,
    pub selector: MetricSelector,
    pub expressions: Vec<ThresholdExpr>,
}

/// Validated set of thresholds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdSet {
    thresholds: Vec<Threshold>,
}

impl ThresholdSet {
    /// Build from the configuration's `selector -> [expression]` table.
    ///
    /// Every selector, expression and aggregation is checked here, so a set
    /// that builds can always be evaluated.
    pub fn from_config(table: &BTreeMap<String, Vec<String>>) -> Result<Self, ThresholdError> {
        let mut thresholds = Vec::with_capacity(table.len());
        for (key, expressions) in table {
            let selector = MetricSelector::parse(key)?;
            let expressions = expressions
                .iter()
                .map(|text| {
                    let expr = ThresholdExpr::parse(text)?;
                    if !selector.metric.supports(&expr.aggregation) {
                        return Err(ThresholdError::UnsupportedAggregation {
                            metric: selector.metric.to_string(),
                            aggregation: expr.aggregation.to_string(),
                        });
                    }
                    Ok(expr)
                })
                .collect::<Result<Vec<_>, _>>()?;
            thresholds.push(Threshold {
                key: key.clone(),
                selector,
                expressions,
            });
        }
        Ok(Self { thresholds })
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.iter().all(|t| t.expressions.is_empty())
    }

    pub fn len(&self) -> usize {
        self.thresholds.iter().map(|t| t.expressions.len()).sum()
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    /// Evaluate every threshold over `outcomes`.
    ///
    /// `elapsed` is the run length used by per-second rates. The result only
    /// depends on the multiset of outcomes, never on their order.
    pub fn evaluate(&self, outcomes: &[RequestOutcome], elapsed: Duration) -> Verdict {
        let mut metrics = BTreeMap::new();
        for threshold in &self.thresholds {
            let results = threshold
                .expressions
                .iter()
                .map(|expr| {
                    let observed =
                        threshold
                            .selector
                            .aggregate(&expr.aggregation, outcomes, elapsed);
                    ThresholdResult {
                        expression: expr.source.clone(),
                        observed,
                        bound: expr.bound,
                        passed: observed.map(|value| expr.holds(value)).unwrap_or(false),
                    }
                })
                .collect::<Vec<_>>();
            metrics.insert(threshold.key.clone(), results);
        }

        let passed = metrics.values().flatten().all(|r: &ThresholdResult| r.passed);
        Verdict { metrics, passed }
    }
}

/// Outcome of one expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub expression: String,
    /// Aggregate value, absent when there were no samples
    pub observed: Option<f64>,
    pub bound: f64,
    pub passed: bool,
}

/// Pass/fail judgement for a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub metrics: BTreeMap<String, Vec<ThresholdResult>>,
    pub passed: bool,
}

impl Verdict {
    /// Results that failed, as `(selector, result)` pairs.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ThresholdResult)> {
        self.metrics.iter().flat_map(|(key, results)| {
            results
                .iter()
                .filter(|r| !r.passed)
                .map(move |r| (key.as_str(), r))
        })
    }

    /// Whether some threshold is breached by an actual observation.
    ///
    /// Missing samples fail the final verdict but do not count as a breach
    /// while the run is still collecting data.
    pub fn any_breached(&self) -> bool {
        self.metrics
            .values()
            .flatten()
            .any(|r| r.observed.is_some() && !r.passed)
    }
}
