/// Staged load profile: the concurrency ramp over wall-clock time.
use crate::config::duration::{format_duration, serde_str};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One segment of the ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadStage {
    /// How long the stage lasts
    #[serde(with = "serde_str")]
    pub duration: Duration,
    /// Concurrency reached at the end of the stage
    pub target: usize,
}

impl LoadStage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }

    /// Parse the `DURATION:TARGET` shorthand, e.g. `30s:10`.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidStage {
            value: value.to_string(),
        };
        let (duration, target) = value.trim().rsplit_once(':').ok_or_else(invalid)?;
        let duration = crate::config::duration::parse_duration(duration)?;
        let target = target.trim().parse::<usize>().map_err(|_| invalid())?;
        Ok(Self { duration, target })
    }
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", format_duration(self.duration), self.target)
    }
}

/// Validated, ordered list of stages.
///
/// The instantaneous target moves linearly across each stage from the
/// previous stage's target (zero before the first stage) to the stage's own
/// target, rounded up so that a ramp toward N starts its first user as soon
/// as the ramp begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadProfile {
    stages: Vec<LoadStage>,
}

impl LoadProfile {
    /// Validate a stage list.
    pub fn new(stages: Vec<LoadStage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::EmptyStages);
        }
        if stages.iter().all(|s| s.duration.is_zero()) {
            return Err(ConfigError::ZeroDuration);
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[LoadStage] {
        &self.stages
    }

    /// Sum of all stage durations.
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Offset from run start at which each stage ends.
    pub fn stage_ends(&self) -> Vec<Duration> {
        self.stages
            .iter()
            .scan(Duration::ZERO, |end, stage| {
                *end += stage.duration;
                Some(*end)
            })
            .collect()
    }

    /// Highest target across all stages.
    pub fn peak_target(&self) -> usize {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    /// Index of the stage active at `elapsed`, or `None` once the profile is over.
    pub fn stage_at(&self, elapsed: Duration) -> Option<usize> {
        self.stage_ends().iter().position(|end| elapsed < *end)
    }

    /// Highest target reached in `(from, to]`.
    ///
    /// Stage ends inside the window count, so a stage shorter than the
    /// sampling interval still contributes its target.
    pub fn peak_between(&self, from: Duration, to: Duration) -> usize {
        self.stage_ends()
            .iter()
            .zip(&self.stages)
            .filter(|(end, _)| from < **end && **end <= to)
            .map(|(_, stage)| stage.target)
            .fold(self.target_at(to), usize::max)
    }

    /// Target concurrency at `elapsed` since run start.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        let mut start = Duration::ZERO;
        let mut prev = 0usize;

        for stage in &self.stages {
            let end = start + stage.duration;
            if elapsed < end {
                let progress =
                    (elapsed - start).as_secs_f64() / stage.duration.as_secs_f64();
                let diff = stage.target as f64 - prev as f64;
                let value = prev as f64 + diff * progress;
                // float noise must not round an exact integer up
                let rounded = (value - 1e-9).ceil().max(0.0) as usize;
                return rounded.min(prev.max(stage.target));
            }
            start = end;
            prev = stage.target;
        }

        prev
    }
}
