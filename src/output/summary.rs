/// Text, JSON and CSV renderings of a run report.
use crate::error::AppError;
use crate::output::Formatter;
use crate::report::RunReport;

/// Human-readable end-of-run summary.
pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format(&self, report: &RunReport) -> Result<String, AppError> {
        let mut output = Vec::new();
        let metrics = &report.metrics;
        let scheduler = &report.scheduler;

        output.push("=== Load Test Summary ===".to_string());
        output.push(format!("Target: {}", report.target));
        output.push(format!("Duration: {:.1}s", report.elapsed_secs));
        output.push(format!(
            "Iterations: {} completed ({} started)",
            scheduler.iterations_completed, scheduler.iterations_started
        ));
        output.push(format!(
            "Virtual users: peak {}, launched {}",
            scheduler.peak_vus, scheduler.vus_launched
        ));
        if report.aborted_by_threshold {
            output.push("Run aborted: threshold breached".to_string());
        } else if report.interrupted {
            output.push("Run interrupted before the profile finished".to_string());
        }
        if scheduler.forced_stops > 0 {
            output.push(format!(
                "Iterations stopped after graceful stop: {}",
                scheduler.forced_stops
            ));
        }
        output.push(String::new());

        if !metrics.steps.is_empty() {
            output.push("Checks".to_string());
            output.push("-".repeat(50));
            for (step, check) in &metrics.steps {
                let mark = if check.fails == 0 { "✓" } else { "✗" };
                output.push(format!(
                    "  {} {:<24} {:>7.2}% ({}/{}) [{}]",
                    mark,
                    check.check,
                    check.rate() * 100.0,
                    check.passes,
                    check.passes + check.fails,
                    step
                ));
            }
            output.push(String::new());
        }

        let trend = &metrics.http_req_duration;
        output.push("Metrics".to_string());
        output.push("-".repeat(50));
        output.push(format!(
            "  http_req_duration: avg={:.2}ms min={:.2}ms med={:.2}ms max={:.2}ms p(90)={:.2}ms p(95)={:.2}ms p(99)={:.2}ms p(99.9)={:.2}ms",
            trend.avg, trend.min, trend.med, trend.max, trend.p90, trend.p95, trend.p99, trend.p99_9
        ));
        output.push(format!(
            "  http_req_failed: {:.2}%",
            metrics.http_req_failed * 100.0
        ));
        output.push(format!(
            "  http_reqs: {} ({:.2}/s)",
            metrics.http_reqs, metrics.http_reqs_rate
        ));
        output.push(format!("  checks: {:.2}%", metrics.checks * 100.0));
        output.push(String::new());

        if !report.verdict.metrics.is_empty() {
            output.push("Thresholds".to_string());
            output.push("-".repeat(50));
            for (selector, results) in &report.verdict.metrics {
                for result in results {
                    let mark = if result.passed { "✓" } else { "✗" };
                    let observed = result
                        .observed
                        .map(|v| format!("{:.4}", v))
                        .unwrap_or_else(|| "no samples".to_string());
                    output.push(format!(
                        "  {} {} {} (observed: {})",
                        mark, selector, result.expression, observed
                    ));
                }
            }
            output.push(String::new());
        }

        output.push(format!(
            "Result: {}",
            if report.passed() { "PASSED" } else { "FAILED" }
        ));
        Ok(output.join("\n"))
    }
}

/// Full report as pretty-printed JSON.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, report: &RunReport) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(report)?)
    }
}

/// Single-row CSV summary for spreadsheets and dashboards.
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format(&self, report: &RunReport) -> Result<String, AppError> {
        let metrics = &report.metrics;
        let trend = &metrics.http_req_duration;
        let header = "target,elapsed_secs,iterations,peak_vus,http_reqs,http_reqs_rate,http_req_failed,checks,avg_ms,min_ms,med_ms,max_ms,p90_ms,p95_ms,p99_ms,p99_9_ms,passed";
        let row = format!(
            "{},{:.3},{},{},{},{:.4},{:.6},{:.6},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{}",
            report.target,
            report.elapsed_secs,
            report.scheduler.iterations_completed,
            report.scheduler.peak_vus,
            metrics.http_reqs,
            metrics.http_reqs_rate,
            metrics.http_req_failed,
            metrics.checks,
            trend.avg,
            trend.min,
            trend.med,
            trend.max,
            trend.p90,
            trend.p95,
            trend.p99,
            trend.p99_9,
            report.passed()
        );
        Ok(format!("{}\n{}", header, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RequestOutcome;
    use crate::report::MetricsSummary;
    use crate::scheduler::SchedulerReport;
    use crate::thresholds::ThresholdSet;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn report(fail_rate_bound: &str) -> RunReport {
        let outcomes: Vec<_> = (0..10)
            .map(|i| RequestOutcome {
                vu: 0,
                iteration: i,
                step: "health".into(),
                check: "status is 200".into(),
                status: Some(if i == 0 { 500 } else { 200 }),
                sent: true,
                latency: Duration::from_millis(10 + i),
                success: i != 0,
                error: None,
            })
            .collect();
        let elapsed = Duration::from_secs(5);

        let mut table = BTreeMap::new();
        table.insert(
            "http_req_failed".to_string(),
            vec![format!("rate<{}", fail_rate_bound)],
        );
        let verdict = ThresholdSet::from_config(&table).unwrap().evaluate(&outcomes, elapsed);

        RunReport {
            target: "http://localhost:8080".into(),
            elapsed_secs: elapsed.as_secs_f64(),
            interrupted: false,
            aborted_by_threshold: false,
            scheduler: SchedulerReport {
                iterations_started: 10,
                iterations_completed: 10,
                vus_launched: 1,
                peak_vus: 1,
                forced_stops: 0,
                interrupted: false,
                elapsed,
                stages: Vec::new(),
            },
            metrics: MetricsSummary::from_outcomes(&outcomes, elapsed),
            verdict,
        }
    }

    #[test]
    fn text_summary_lists_checks_and_thresholds() {
        let output = TextFormatter.format(&report("0.5")).unwrap();
        assert!(output.contains("Target: http://localhost:8080"));
        assert!(output.contains("✗ status is 200"));
        assert!(output.contains("http_reqs: 10 (2.00/s)"));
        assert!(output.contains("✓ http_req_failed rate<0.5 (observed: 0.1000)"));
        assert!(output.ends_with("Result: PASSED"));

        let failing = TextFormatter.format(&report("0.01")).unwrap();
        assert!(failing.ends_with("Result: FAILED"));
    }

    #[test]
    fn json_summary_carries_verdict() {
        let output = JsonFormatter.format(&report("0.01")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json["verdict"]["passed"], serde_json::json!(false));
        assert_eq!(json["metrics"]["http_reqs"], serde_json::json!(10));
        assert_eq!(
            json["verdict"]["metrics"]["http_req_failed"][0]["observed"],
            serde_json::json!(0.1)
        );
        assert_eq!(json["scheduler"]["elapsed_secs"], serde_json::json!(5.0));
    }

    #[test]
    fn csv_summary_is_one_row() {
        let output = CsvFormatter.format(&report("0.5")).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0].split(',').count(),
            lines[1].split(',').count()
        );
        assert!(lines[1].starts_with("http://localhost:8080,5.000,10,1,10,2.0000"));
        assert!(lines[1].ends_with(",true"));
    }
}
