/// Built-in metrics, selectors and the aggregations defined over them.
use crate::error::ThresholdError;
use crate::recorder::RequestOutcome;
use crate::thresholds::expr::Aggregation;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Distribution of values (latency in ms)
    Trend,
    /// Fraction of non-zero samples
    Rate,
    /// Monotonic count of events
    Counter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricName {
    HttpReqDuration,
    HttpReqFailed,
    Checks,
    HttpReqs,
}

impl MetricName {
    pub const ALL: [MetricName; 4] = [
        MetricName::HttpReqDuration,
        MetricName::HttpReqFailed,
        MetricName::Checks,
        MetricName::HttpReqs,
    ];

    pub fn parse(name: &str) -> Result<Self, ThresholdError> {
        Self::ALL
            .into_iter()
            .find(|metric| metric.as_str() == name)
            .ok_or_else(|| ThresholdError::UnknownMetric(name.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::HttpReqDuration => "http_req_duration",
            MetricName::HttpReqFailed => "http_req_failed",
            MetricName::Checks => "checks",
            MetricName::HttpReqs => "http_reqs",
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricName::HttpReqDuration => MetricKind::Trend,
            MetricName::HttpReqFailed | MetricName::Checks => MetricKind::Rate,
            MetricName::HttpReqs => MetricKind::Counter,
        }
    }

    /// Whether `aggregation` is defined for this metric.
    pub fn supports(&self, aggregation: &Aggregation) -> bool {
        match self.kind() {
            MetricKind::Trend => matches!(
                aggregation,
                Aggregation::Avg
                    | Aggregation::Min
                    | Aggregation::Max
                    | Aggregation::Med
                    | Aggregation::Percentile(_)
            ),
            MetricKind::Rate => matches!(aggregation, Aggregation::Rate),
            MetricKind::Counter => matches!(aggregation, Aggregation::Count | Aggregation::Rate),
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric narrowed by optional tags, e.g. `http_req_duration{step:create_team}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSelector {
    pub metric: MetricName,
    pub step: Option<String>,
    pub expected_response: Option<bool>,
}

impl MetricSelector {
    pub fn new(metric: MetricName) -> Self {
        Self {
            metric,
            step: None,
            expected_response: None,
        }
    }

    pub fn parse(text: &str) -> Result<Self, ThresholdError> {
        let text = text.trim();
        let malformed = || ThresholdError::MalformedSelector(text.to_string());

        let (name, tags) = match text.find('{') {
            Some(open) => {
                let tags = text[open + 1..].strip_suffix('}').ok_or_else(malformed)?;
                (&text[..open], Some(tags))
            }
            None if text.contains('}') => return Err(malformed()),
            None => (text, None),
        };

        let mut selector = Self::new(MetricName::parse(name.trim())?);
        let Some(tags) = tags else {
            return Ok(selector);
        };

        for pair in tags.split(',') {
            let (key, value) = pair.split_once(':').ok_or_else(malformed)?;
            let (key, value) = (key.trim(), value.trim());
            if value.is_empty() {
                return Err(malformed());
            }
            match key {
                "step" => selector.step = Some(value.to_string()),
                "expected_response" => {
                    let flag = value.parse::<bool>().map_err(|_| malformed())?;
                    selector.expected_response = Some(flag);
                }
                other => {
                    return Err(ThresholdError::UnknownTag {
                        metric: selector.metric.to_string(),
                        tag: other.to_string(),
                    })
                }
            }
        }
        Ok(selector)
    }

    /// Whether an outcome belongs to this selector.
    pub fn matches(&self, outcome: &RequestOutcome) -> bool {
        if let Some(step) = &self.step {
            if &outcome.step != step {
                return false;
            }
        }
        if let Some(expected) = self.expected_response {
            if outcome.success != expected {
                return false;
            }
        }
        true
    }

    /// Compute `aggregation` over the matching outcomes.
    ///
    /// Returns `None` when the aggregate is undefined: no samples for a trend
    /// or rate, or a zero-length run for a per-second counter rate. A counter
    /// `count` over no samples is a real zero.
    pub fn aggregate(
        &self,
        aggregation: &Aggregation,
        outcomes: &[RequestOutcome],
        elapsed: Duration,
    ) -> Option<f64> {
        let matching = outcomes.iter().filter(|o| self.matches(o));
        match self.metric {
            MetricName::HttpReqDuration => {
                let mut values: Vec<f64> = matching
                    .filter(|o| o.sent)
                    .map(RequestOutcome::latency_ms)
                    .collect();
                values.sort_by(f64::total_cmp);
                trend(aggregation, &values)
            }
            MetricName::HttpReqFailed => rate(matching.map(|o| !o.success)),
            MetricName::Checks => rate(matching.map(|o| o.success)),
            MetricName::HttpReqs => {
                let count = matching.count() as f64;
                match aggregation {
                    Aggregation::Count => Some(count),
                    Aggregation::Rate if !elapsed.is_zero() => Some(count / elapsed.as_secs_f64()),
                    _ => None,
                }
            }
        }
    }
}

impl fmt::Display for MetricSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.metric)?;
        let mut tags = Vec::new();
        if let Some(step) = &self.step {
            tags.push(format!("step:{}", step));
        }
        if let Some(expected) = self.expected_response {
            tags.push(format!("expected_response:{}", expected));
        }
        if !tags.is_empty() {
            write!(f, "{{{}}}", tags.join(","))?;
        }
        Ok(())
    }
}

fn trend(aggregation: &Aggregation, sorted: &[f64]) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    match aggregation {
        Aggregation::Avg => Some(sorted.iter().sum::<f64>() / sorted.len() as f64),
        Aggregation::Min => sorted.first().copied(),
        Aggregation::Max => sorted.last().copied(),
        Aggregation::Med => percentile(sorted, 50.0),
        Aggregation::Percentile(p) => percentile(sorted, *p),
        Aggregation::Rate | Aggregation::Count => None,
    }
}

fn rate(samples: impl Iterator<Item = bool>) -> Option<f64> {
    let (hits, total) = samples.fold((0u64, 0u64), |(hits, total), hit| {
        (hits + hit as u64, total + 1)
    });
    if total == 0 {
        None
    } else {
        Some(hits as f64 / total as f64)
    }
}

/// Nearest-rank percentile of ascending `sorted` values.
///
/// `rank = ceil(p / 100 * n)` clamped to `[1, n]`; the result is always one of
/// the observed values.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    // 99.9 has no exact binary form; keep 0.999 * 1000 at rank 999
    let rank = ((p * n as f64) / 100.0 - 1e-9).ceil().max(0.0) as usize;
    let rank = rank.clamp(1, n);
    Some(sorted[rank - 1])
}
