/// Property tests for threshold evaluation.
use loadgate::recorder::RequestOutcome;
use loadgate::thresholds::ThresholdSet;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::time::Duration;

const ELAPSED: Duration = Duration::from_secs(60);

fn outcome(latency_ms: u64, success: bool) -> RequestOutcome {
    RequestOutcome {
        vu: latency_ms % 7,
        iteration: 0,
        step: if success { "get_team" } else { "create_team" }.to_string(),
        check: "check".to_string(),
        status: Some(if success { 200 } else { 500 }),
        sent: true,
        latency: Duration::from_millis(latency_ms),
        success,
        error: None,
    }
}

/// Upper-bounded latency and reliability thresholds.
fn threshold_set() -> ThresholdSet {
    let mut table = BTreeMap::new();
    table.insert(
        "http_req_duration".to_string(),
        vec![
            "p(99.9)<300".to_string(),
            "p(95)<300".to_string(),
            "med<300".to_string(),
            "avg<300".to_string(),
            "max<300".to_string(),
        ],
    );
    table.insert("http_req_failed".to_string(), vec!["rate<0.05".to_string()]);
    table.insert("checks".to_string(), vec!["rate>0.9".to_string()]);
    ThresholdSet::from_config(&table).expect("valid thresholds")
}

fn rate_threshold(expr: &str) -> ThresholdSet {
    let mut table = BTreeMap::new();
    table.insert("http_req_failed".to_string(), vec![expr.to_string()]);
    ThresholdSet::from_config(&table).expect("valid thresholds")
}

fn outcomes_strategy() -> impl Strategy<Value = Vec<RequestOutcome>> {
    prop::collection::vec((1u64..1_000, prop::bool::weighted(0.95)), 0..300)
        .prop_map(|raw| raw.into_iter().map(|(ms, ok)| outcome(ms, ok)).collect())
}

fn passing_strategy() -> impl Strategy<Value = Vec<RequestOutcome>> {
    prop::collection::vec(1u64..300, 1..100)
        .prop_map(|raw| raw.into_iter().map(|ms| outcome(ms, true)).collect())
}

fn failing_strategy() -> impl Strategy<Value = Vec<RequestOutcome>> {
    prop::collection::vec(300u64..5_000, 1..100)
        .prop_map(|raw| raw.into_iter().map(|ms| outcome(ms, false)).collect())
}

proptest! {
    #[test]
    fn evaluation_is_deterministic(outcomes in outcomes_strategy(), rotate in 0usize..300) {
        let set = threshold_set();
        let first = set.evaluate(&outcomes, ELAPSED);
        let second = set.evaluate(&outcomes, ELAPSED);
        prop_assert_eq!(&first, &second);

        let mut reordered = outcomes.clone();
        reordered.reverse();
        if !reordered.is_empty() {
            let shift = rotate % reordered.len();
            reordered.rotate_left(shift);
        }
        prop_assert_eq!(&first, &set.evaluate(&reordered, ELAPSED));
    }

    #[test]
    fn passing_outcomes_never_break_a_passing_threshold(
        base in outcomes_strategy(),
        extra in passing_strategy(),
    ) {
        let set = threshold_set();
        let before = set.evaluate(&base, ELAPSED);

        let mut grown = base.clone();
        grown.extend(extra);
        let after = set.evaluate(&grown, ELAPSED);

        for (selector, results) in &before.metrics {
            for (old, new) in results.iter().zip(&after.metrics[selector]) {
                if old.passed {
                    prop_assert!(
                        new.passed,
                        "{} {} flipped to failing ({:?} -> {:?})",
                        selector, old.expression, old.observed, new.observed
                    );
                }
            }
        }
    }

    #[test]
    fn failing_outcomes_never_rescue_a_failing_threshold(
        base in outcomes_strategy(),
        extra in failing_strategy(),
    ) {
        let set = threshold_set();
        let before = set.evaluate(&base, ELAPSED);

        let mut grown = base.clone();
        grown.extend(extra);
        let after = set.evaluate(&grown, ELAPSED);

        for (selector, results) in &before.metrics {
            for (old, new) in results.iter().zip(&after.metrics[selector]) {
                if !old.passed {
                    prop_assert!(
                        !new.passed,
                        "{} {} flipped to passing ({:?} -> {:?})",
                        selector, old.expression, old.observed, new.observed
                    );
                }
            }
        }
    }
}

#[test]
fn failure_rate_bound_is_strict() {
    let set = rate_threshold("rate<0.001");

    // 2 failures in 1000 requests: 0.002
    let mut outcomes: Vec<_> = (0..998).map(|_| outcome(20, true)).collect();
    outcomes.extend((0..2).map(|_| outcome(20, false)));
    let verdict = set.evaluate(&outcomes, ELAPSED);
    assert_eq!(verdict.metrics["http_req_failed"][0].observed, Some(0.002));
    assert!(!verdict.passed);

    // 1 failure in 2000 requests: 0.0005
    let mut outcomes: Vec<_> = (0..1_999).map(|_| outcome(20, true)).collect();
    outcomes.push(outcome(20, false));
    let verdict = set.evaluate(&outcomes, ELAPSED);
    assert_eq!(verdict.metrics["http_req_failed"][0].observed, Some(0.0005));
    assert!(verdict.passed);
}

#[test]
fn percentile_uses_nearest_rank() {
    let mut table = BTreeMap::new();
    table.insert(
        "http_req_duration".to_string(),
        vec!["p(99.9)<300".to_string()],
    );
    let set = ThresholdSet::from_config(&table).unwrap();

    // 999 fast requests and one slow: rank ceil(0.999 * 1000) = 999 is fast
    let mut outcomes: Vec<_> = (0..999).map(|_| outcome(100, true)).collect();
    outcomes.push(outcome(2_000, true));
    let verdict = set.evaluate(&outcomes, ELAPSED);
    assert_eq!(verdict.metrics["http_req_duration"][0].observed, Some(100.0));
    assert!(verdict.passed);

    // a second slow request lands on rank 999
    outcomes.pop();
    outcomes.pop();
    outcomes.push(outcome(2_000, true));
    outcomes.push(outcome(2_000, true));
    let verdict = set.evaluate(&outcomes, ELAPSED);
    assert_eq!(verdict.metrics["http_req_duration"][0].observed, Some(2_000.0));
    assert!(!verdict.passed);
}
