/// Virtual-user scheduler driving iterations along a load profile.
use crate::scheduler::profile::LoadProfile;
use indicatif::ProgressBar;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};

/// Identity of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationInfo {
    /// Virtual user id, unique within a run
    pub vu: u64,
    /// Iteration number within that virtual user, starting at zero
    pub iteration: u64,
}

/// Something that can run one scenario iteration.
///
/// Implementations must absorb their own failures: the scheduler treats every
/// returned iteration as finished, whatever happened inside it.
#[async_trait::async_trait]
pub trait IterationRunner: Send + Sync + 'static {
    async fn run_iteration(&self, info: IterationInfo);
}

/// Run-scoped abort switch shared between the operator and the run.
#[derive(Clone)]
pub struct AbortSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Stop launching iterations. In-flight iterations finish on their own.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// How often the target is re-evaluated
    pub tick_interval: Duration,
    /// How long in-flight iterations may run after the profile ends
    pub graceful_stop: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            graceful_stop: Duration::from_secs(30),
        }
    }
}

/// Active virtual users sampled when a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageObservation {
    pub stage: usize,
    pub target: usize,
    pub active: usize,
}

/// What the scheduler did during a run.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerReport {
    pub iterations_started: u64,
    pub iterations_completed: u64,
    pub vus_launched: u64,
    pub peak_vus: usize,
    /// Iterations cut off after the graceful stop window
    pub forced_stops: usize,
    /// Whether the run was aborted before the profile ended
    pub interrupted: bool,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub stages: Vec<StageObservation>,
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(value.as_secs_f64())
}

#[derive(Default)]
struct VuShared {
    active: AtomicUsize,
    started: AtomicU64,
    completed: AtomicU64,
}

/// One unit of the active count, released exactly once.
///
/// Dropping the slot (return, panic or abort) releases it unless the user
/// already retired through [`Slot::try_retire`].
struct Slot {
    shared: Arc<VuShared>,
    released: bool,
}

impl Slot {
    fn try_retire(&mut self, target: usize) -> bool {
        let active = self.shared.active.load(Ordering::SeqCst);
        if active <= target {
            return false;
        }
        if self
            .shared
            .active
            .compare_exchange(active, active - 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.released = true;
            return true;
        }
        false
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if !self.released {
            self.shared.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Load profile scheduler.
pub struct Scheduler {
    profile: LoadProfile,
    options: SchedulerOptions,
}

impl Scheduler {
    pub fn new(profile: LoadProfile, options: SchedulerOptions) -> Self {
        Self { profile, options }
    }

    pub fn profile(&self) -> &LoadProfile {
        &self.profile
    }

    /// Run the profile to completion (or abort).
    pub async fn run<R: IterationRunner>(
        &self,
        runner: Arc<R>,
        abort: AbortSignal,
    ) -> SchedulerReport {
        self.run_with_progress(runner, abort, None).await
    }

    /// Run the profile with an optional progress bar.
    pub async fn run_with_progress<R: IterationRunner>(
        &self,
        runner: Arc<R>,
        abort: AbortSignal,
        progress: Option<Arc<ProgressBar>>,
    ) -> SchedulerReport {
        let start = Instant::now();
        let total = self.profile.total_duration();
        let stage_ends = self.profile.stage_ends();

        let shared = Arc::new(VuShared::default());
        let (target_tx, target_rx) = watch::channel(0usize);
        let mut abort_rx = abort.subscribe();
        let mut tasks = JoinSet::new();

        let mut ticker = interval(self.options.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut observations: Vec<StageObservation> = Vec::with_capacity(stage_ends.len());
        let mut vus_launched = 0u64;
        let mut peak_vus = 0usize;
        let mut interrupted = false;
        let mut last_tick: Option<Duration> = None;

        tracing::info!(
            stages = self.profile.stages().len(),
            total_secs = total.as_secs_f64(),
            peak_target = self.profile.peak_target(),
            "starting load profile"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = abort_rx.changed() => {}
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join(joined);
                    continue;
                }
            }

            let elapsed = start.elapsed();

            if abort.is_aborted() {
                let active = shared.active.load(Ordering::SeqCst);
                self.observe_stage_ends(&mut observations, &stage_ends, elapsed, active);
                tracing::warn!(
                    elapsed_secs = elapsed.as_secs_f64(),
                    active,
                    "run aborted; no new iterations will start"
                );
                interrupted = true;
                break;
            }
            let target = match last_tick {
                Some(previous) => self.profile.peak_between(previous, elapsed),
                None => self.profile.target_at(elapsed),
            };
            last_tick = Some(elapsed);
            target_tx.send_replace(target);

            while shared.active.load(Ordering::SeqCst) < target {
                shared.active.fetch_add(1, Ordering::SeqCst);
                let slot = Slot {
                    shared: shared.clone(),
                    released: false,
                };
                tasks.spawn(virtual_user(
                    runner.clone(),
                    vus_launched,
                    slot,
                    target_rx.clone(),
                    abort.subscribe(),
                ));
                vus_launched += 1;
            }
            let active = shared.active.load(Ordering::SeqCst);
            peak_vus = peak_vus.max(active);
            self.observe_stage_ends(&mut observations, &stage_ends, elapsed, active);
            if elapsed >= total {
                break;
            }

            if let Some(ref pb) = progress {
                pb.set_position(elapsed.as_millis() as u64);
                pb.set_message(format!(
                    "VUs: {}/{} | Iterations: {}",
                    shared.active.load(Ordering::SeqCst),
                    target,
                    shared.completed.load(Ordering::Relaxed),
                ));
            }
        }

        // every remaining user retires after its current iteration
        target_tx.send_replace(0);

        let in_flight = tasks.len();
        if in_flight > 0 {
            tracing::info!(
                in_flight,
                graceful_stop_secs = self.options.graceful_stop.as_secs_f64(),
                "waiting for in-flight iterations"
            );
        }
        let drain = async {
            while let Some(joined) = tasks.join_next().await {
                log_join(joined);
            }
        };
        let drained = timeout(self.options.graceful_stop, drain).await;

        let mut forced_stops = 0;
        if drained.is_err() {
            forced_stops = tasks.len();
            tracing::warn!(
                forced_stops,
                "graceful stop expired; aborting remaining iterations"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        if let Some(ref pb) = progress {
            pb.finish_with_message(format!(
                "Load profile completed: {} iterations",
                shared.completed.load(Ordering::Relaxed)
            ));
        }

        SchedulerReport {
            iterations_started: shared.started.load(Ordering::SeqCst),
            iterations_completed: shared.completed.load(Ordering::SeqCst),
            vus_launched,
            peak_vus,
            forced_stops,
            interrupted,
            elapsed: start.elapsed(),
            stages: observations,
        }
    }
}

impl Scheduler {
    /// Record every stage that has ended by `elapsed` and not been recorded yet.
    fn observe_stage_ends(
        &self,
        observations: &mut Vec<StageObservation>,
        stage_ends: &[Duration],
        elapsed: Duration,
        active: usize,
    ) {
        while observations.len() < stage_ends.len() && elapsed >= stage_ends[observations.len()] {
            let stage = observations.len();
            let target = self.profile.stages()[stage].target;
            tracing::debug!(stage, stage_target = target, active, "stage finished");
            observations.push(StageObservation {
                stage,
                target,
                active,
            });
        }
    }
}

async fn virtual_user<R: IterationRunner>(
    runner: Arc<R>,
    vu: u64,
    mut slot: Slot,
    target: watch::Receiver<usize>,
    abort: watch::Receiver<bool>,
) {
    let mut iteration = 0u64;
    loop {
        if *abort.borrow() {
            break;
        }
        // a launched user runs at least once, even if the target fell before it started
        if iteration > 0 {
            let current_target = *target.borrow();
            if slot.try_retire(current_target) {
                tracing::trace!(vu, iteration, "virtual user retired");
                return;
            }
            if slot.shared.active.load(Ordering::SeqCst) > current_target {
                // lost a retire race; re-check before starting new work
                tokio::task::yield_now().await;
                continue;
            }
        }

        slot.shared.started.fetch_add(1, Ordering::SeqCst);
        runner.run_iteration(IterationInfo { vu, iteration }).await;
        slot.shared.completed.fetch_add(1, Ordering::SeqCst);
        iteration += 1;
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        if err.is_panic() {
            tracing::error!(error = %err, "virtual user panicked");
        }
    }
}
