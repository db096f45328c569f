/// One load test run: scheduler, executor, recorder and verdict wired together.
use crate::config::{RunConfig, RunPlan};
use crate::error::AppError;
use crate::http::HttpClient;
use crate::recorder::OutcomeRecorder;
use crate::report::{MetricsSummary, RunReport};
use crate::scenario::ScenarioExecutor;
use crate::scheduler::{AbortSignal, Scheduler};
use crate::thresholds::ThresholdSet;
use indicatif::ProgressBar;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const MONITOR_INTERVAL: Duration = Duration::from_secs(1);

/// A configured load test.
pub struct LoadTest<C: HttpClient> {
    config: RunConfig,
    plan: RunPlan,
    client: Arc<C>,
    recorder: Arc<OutcomeRecorder>,
}

impl<C: HttpClient + 'static> LoadTest<C> {
    /// Validate `config` and bind it to a client. Nothing is sent yet.
    pub fn new(config: RunConfig, client: Arc<C>) -> Result<Self, AppError> {
        let plan = config.plan()?;
        Ok(Self {
            config,
            plan,
            client,
            recorder: Arc::new(OutcomeRecorder::new()),
        })
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    pub fn recorder(&self) -> &Arc<OutcomeRecorder> {
        &self.recorder
    }

    pub async fn run(&self, abort: AbortSignal) -> RunReport {
        self.run_with_progress(abort, None).await
    }

    /// Drive the load profile to completion and judge the result.
    pub async fn run_with_progress(
        &self,
        abort: AbortSignal,
        progress: Option<Arc<ProgressBar>>,
    ) -> RunReport {
        let executor = Arc::new(ScenarioExecutor::new(
            self.client.clone(),
            Arc::new(self.plan.workflow.clone()),
            self.config.base_url(),
            self.config.think_time,
            self.recorder.clone(),
        ));
        let scheduler = Scheduler::new(self.plan.profile.clone(), self.config.scheduler_options());

        tracing::info!(
            base_url = %self.config.base_url(),
            client = self.client.name(),
            thresholds = self.plan.thresholds.len(),
            "starting load test"
        );

        let start = Instant::now();
        let breached = Arc::new(AtomicBool::new(false));
        let monitor = self.config.abort_on_fail.then(|| {
            tokio::spawn(monitor_thresholds(
                self.plan.thresholds.clone(),
                self.recorder.clone(),
                abort.clone(),
                breached.clone(),
                self.config.abort_eval_delay,
                start,
            ))
        });

        let counters = progress
            .clone()
            .map(|pb| tokio::spawn(show_request_counts(pb, self.recorder.clone())));

        let scheduler_report = scheduler
            .run_with_progress(executor, abort.clone(), progress)
            .await;

        for handle in [monitor, counters].into_iter().flatten() {
            handle.abort();
        }

        let elapsed = start.elapsed();
        let outcomes = self.recorder.snapshot();
        let verdict = self.plan.thresholds.evaluate(&outcomes, elapsed);
        let metrics = MetricsSummary::from_outcomes(&outcomes, elapsed);

        if verdict.passed {
            tracing::info!(requests = outcomes.len(), "all thresholds passed");
        } else {
            for (selector, result) in verdict.failures() {
                tracing::warn!(
                    selector,
                    expression = %result.expression,
                    observed = ?result.observed,
                    "threshold failed"
                );
            }
        }

        RunReport {
            target: self.config.base_url().to_string(),
            elapsed_secs: elapsed.as_secs_f64(),
            interrupted: scheduler_report.interrupted,
            aborted_by_threshold: breached.load(Ordering::SeqCst),
            scheduler: scheduler_report,
            metrics,
            verdict,
        }
    }
}

/// Evaluate thresholds every second and abort the run on the first breach.
async fn monitor_thresholds(
    thresholds: ThresholdSet,
    recorder: Arc<OutcomeRecorder>,
    abort: AbortSignal,
    breached: Arc<AtomicBool>,
    delay: Duration,
    start: Instant,
) {
    tokio::time::sleep(delay).await;
    let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
    loop {
        ticker.tick().await;
        if abort.is_aborted() {
            return;
        }
        let verdict = thresholds.evaluate(&recorder.snapshot(), start.elapsed());
        if verdict.any_breached() {
            for (selector, result) in verdict.failures().filter(|(_, r)| r.observed.is_some()) {
                tracing::error!(
                    selector,
                    expression = %result.expression,
                    observed = ?result.observed,
                    "threshold breached; aborting run"
                );
            }
            breached.store(true, Ordering::SeqCst);
            abort.abort();
            return;
        }
    }
}

/// Keep the progress bar's request counters current.
async fn show_request_counts(pb: Arc<ProgressBar>, recorder: Arc<OutcomeRecorder>) {
    let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
    loop {
        ticker.tick().await;
        pb.set_prefix(format!(
            "{} reqs, {} failed",
            recorder.total(),
            recorder.failed()
        ));
    }
}
