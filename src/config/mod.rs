/// Run configuration: TOML file, defaults and command-line overrides.
pub mod duration;

use crate::error::ConfigError;
use crate::scenario::Workflow;
use crate::scheduler::{LoadProfile, LoadStage, SchedulerOptions};
use crate::thresholds::ThresholdSet;
use duration::{format_duration, parse_duration, serde_str};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Pause after each iteration, either fixed or uniformly random in a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThinkTime {
    pub min: Duration,
    pub max: Duration,
}

impl ThinkTime {
    pub fn fixed(value: Duration) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Parse `1s`, `500ms-1500ms` or `250-750ms`.
    ///
    /// In the last form the lower bound borrows the upper bound's unit.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let value = value.trim();
        let Some((low, high)) = value.split_once('-').filter(|(low, _)| !low.is_empty()) else {
            return parse_duration(value).map(Self::fixed);
        };

        let max = parse_duration(high)?;
        let low = low.trim();
        let min = match parse_duration(low) {
            Ok(min) => min,
            Err(_) if low.chars().all(|c| c.is_ascii_digit() || c == '.') => {
                let unit = high
                    .trim()
                    .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.');
                parse_duration(&format!("{}{}", low, unit))?
            }
            Err(err) => return Err(err),
        };

        if min > max {
            return Err(ConfigError::InvalidDuration {
                value: value.to_string(),
                reason: "think time minimum exceeds maximum".to_string(),
            });
        }
        Ok(Self { min, max })
    }

    /// Pick the pause for one iteration.
    pub fn sample(&self) -> Duration {
        if self.min >= self.max {
            return self.min;
        }
        let low = self.min.as_nanos() as u64;
        let high = self.max.as_nanos() as u64;
        Duration::from_nanos(fastrand::u64(low..=high))
    }
}

impl Default for ThinkTime {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

impl std::fmt::Display for ThinkTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.min == self.max {
            write!(f, "{}", format_duration(self.min))
        } else {
            write!(
                f,
                "{}-{}",
                format_duration(self.min),
                format_duration(self.max)
            )
        }
    }
}

impl TryFrom<String> for ThinkTime {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ThinkTime> for String {
    fn from(value: ThinkTime) -> Self {
        value.to_string()
    }
}

/// Everything a run needs, fixed before the first request is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Target service root, e.g. `http://localhost:8080`
    pub base_url: String,
    pub stages: Vec<LoadStage>,
    /// Metric selector to threshold expressions
    pub thresholds: BTreeMap<String, Vec<String>>,
    pub think_time: ThinkTime,
    #[serde(with = "serde_str")]
    pub request_timeout: Duration,
    /// Time allowed for in-flight iterations once the profile ends
    #[serde(with = "serde_str")]
    pub graceful_stop: Duration,
    #[serde(with = "serde_str")]
    pub tick_interval: Duration,
    /// Abort the run as soon as a threshold is breached
    pub abort_on_fail: bool,
    #[serde(with = "serde_str")]
    pub abort_eval_delay: Duration,
    /// Extra headers sent with every request
    pub headers: BTreeMap<String, String>,
    /// Custom workflow; the built-in reviewer flow when absent
    pub workflow: Option<Workflow>,
}

impl Default for RunConfig {
    fn default() -> Self {
        let mut thresholds = BTreeMap::new();
        thresholds.insert(
            "http_req_duration".to_string(),
            vec!["p(99.9)<300".to_string()],
        );
        thresholds.insert("http_req_failed".to_string(), vec!["rate<0.001".to_string()]);

        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            stages: vec![
                LoadStage::new(Duration::from_secs(30), 10),
                LoadStage::new(Duration::from_secs(60), 10),
                LoadStage::new(Duration::from_secs(30), 0),
            ],
            thresholds,
            think_time: ThinkTime::default(),
            request_timeout: Duration::from_secs(60),
            graceful_stop: Duration::from_secs(30),
            tick_interval: Duration::from_millis(100),
            abort_on_fail: false,
            abort_eval_delay: Duration::from_secs(10),
            headers: BTreeMap::new(),
            workflow: None,
        }
    }
}

/// Validated pieces derived from a [`RunConfig`].
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub profile: LoadProfile,
    pub thresholds: ThresholdSet,
    pub workflow: Workflow,
}

impl RunConfig {
    /// Load a TOML configuration file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, crate::error::AppError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Check every part of the configuration and build the run plan.
    pub fn plan(&self) -> Result<RunPlan, ConfigError> {
        self.validate_base_url()?;
        if self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidDuration {
                value: format_duration(self.tick_interval),
                reason: "tick interval must be positive".to_string(),
            });
        }

        let profile = LoadProfile::new(self.stages.clone())?;
        let thresholds = ThresholdSet::from_config(&self.thresholds)?;
        let workflow = self.workflow.clone().unwrap_or_default();
        workflow.validate()?;

        Ok(RunPlan {
            profile,
            thresholds,
            workflow,
        })
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            tick_interval: self.tick_interval,
            graceful_stop: self.graceful_stop,
        }
    }

    fn validate_base_url(&self) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidBaseUrl(self.base_url.clone());
        let rest = self
            .base_url
            .strip_prefix("http://")
            .or_else(|| self.base_url.strip_prefix("https://"))
            .ok_or_else(invalid)?;
        let host = rest.split('/').next().unwrap_or_default();
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(invalid());
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Command-line values layered over the file configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    /// `DURATION:TARGET` entries; replace the whole stage list when present
    pub stages: Vec<String>,
    /// `SELECTOR=EXPRESSION` entries; replace that selector's expressions
    pub thresholds: Vec<String>,
    pub think_time: Option<String>,
    pub request_timeout: Option<String>,
    pub graceful_stop: Option<String>,
    pub abort_on_fail: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut RunConfig) -> Result<(), ConfigError> {
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if !self.stages.is_empty() {
            config.stages = self
                .stages
                .iter()
                .map(|s| LoadStage::parse(s))
                .collect::<Result<_, _>>()?;
        }

        let mut replaced: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in &self.thresholds {
            let (selector, expression) = entry
                .split_once('=')
                .filter(|(s, e)| !s.trim().is_empty() && !e.trim().is_empty())
                .ok_or_else(|| ConfigError::InvalidThresholdOverride {
                    value: entry.clone(),
                })?;
            replaced
                .entry(selector.trim().to_string())
                .or_default()
                .push(expression.trim().to_string());
        }
        config.thresholds.extend(replaced);

        if let Some(think_time) = &self.think_time {
            config.think_time = ThinkTime::parse(think_time)?;
        }
        if let Some(timeout) = &self.request_timeout {
            config.request_timeout = parse_duration(timeout)?;
        }
        if let Some(graceful_stop) = &self.graceful_stop {
            config.graceful_stop = parse_duration(graceful_stop)?;
        }
        if self.abort_on_fail {
            config.abort_on_fail = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ThresholdError, WorkflowError};

    #[test]
    fn defaults_match_reference_profile() {
        let config = RunConfig::default();
        assert_eq!(config.base_url(), "http://localhost:8080");
        assert_eq!(config.stages.len(), 3);
        assert_eq!(config.think_time, ThinkTime::fixed(Duration::from_secs(1)));

        let plan = config.plan().expect("defaults are valid");
        assert_eq!(plan.profile.total_duration(), Duration::from_secs(120));
        assert_eq!(plan.profile.peak_target(), 10);
        assert_eq!(plan.thresholds.len(), 2);
        assert_eq!(plan.workflow.steps.len(), 7);
    }

    #[test]
    fn parses_think_time_forms() {
        assert_eq!(
            ThinkTime::parse("500ms").unwrap(),
            ThinkTime::fixed(Duration::from_millis(500))
        );
        let range = ThinkTime::parse("250-750ms").unwrap();
        assert_eq!(range.min, Duration::from_millis(250));
        assert_eq!(range.max, Duration::from_millis(750));
        assert_eq!(
            ThinkTime::parse("1s-2s").unwrap(),
            ThinkTime {
                min: Duration::from_secs(1),
                max: Duration::from_secs(2)
            }
        );
        assert!(ThinkTime::parse("2s-1s").is_err());
        assert!(ThinkTime::parse("-1s").is_err());
        assert!(ThinkTime::parse("fast").is_err());
        assert_eq!(range.to_string(), "250ms-750ms");
    }

    #[test]
    fn think_time_samples_stay_in_range() {
        let range = ThinkTime::parse("100ms-200ms").unwrap();
        for _ in 0..1_000 {
            let pause = range.sample();
            assert!(pause >= range.min && pause <= range.max);
        }
        let fixed = ThinkTime::fixed(Duration::from_secs(1));
        assert_eq!(fixed.sample(), Duration::from_secs(1));
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = RunConfig::from_toml(
            r#"
            base_url = "http://svc:9000/"
            think_time = "0s"
            graceful_stop = "5s"
            abort_on_fail = true

            [[stages]]
            duration = "10s"
            target = 5

            [thresholds]
            "http_req_duration{step:create_team}" = ["p(95)<200", "max<1000"]

            [headers]
            X-Run = "nightly"
            "#,
        )
        .expect("valid config");

        assert_eq!(config.base_url(), "http://svc:9000");
        assert_eq!(config.think_time, ThinkTime::fixed(Duration::ZERO));
        assert_eq!(config.graceful_stop, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.stages, vec![LoadStage::new(Duration::from_secs(10), 5)]);
        assert_eq!(config.thresholds.len(), 1);
        assert_eq!(config.headers["X-Run"], "nightly");
        assert!(config.abort_on_fail);
        assert!(config.plan().is_ok());
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(matches!(
            RunConfig::from_toml("vus = 10"),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            RunConfig::from_toml("[[stages]]\nduration = \"-5s\"\ntarget = 1"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn plan_rejects_invalid_configs() {
        let config = RunConfig {
            stages: Vec::new(),
            ..RunConfig::default()
        };
        assert!(matches!(config.plan(), Err(ConfigError::EmptyStages)));

        let config = RunConfig {
            stages: vec![LoadStage::new(Duration::ZERO, 3)],
            ..RunConfig::default()
        };
        assert!(matches!(config.plan(), Err(ConfigError::ZeroDuration)));

        let mut config = RunConfig::default();
        config.thresholds.insert("vus".into(), vec!["max<10".into()]);
        assert!(matches!(
            config.plan(),
            Err(ConfigError::Threshold(ThresholdError::UnknownMetric(_)))
        ));

        let mut workflow = Workflow::reviewer_flow();
        workflow.steps.swap(4, 6);
        let config = RunConfig {
            workflow: Some(workflow),
            ..RunConfig::default()
        };
        assert!(matches!(
            config.plan(),
            Err(ConfigError::Workflow(WorkflowError::DependencyOrder { .. }))
        ));

        for url in ["localhost:8080", "ftp://host", "http://", "http:// bad"] {
            let config = RunConfig {
                base_url: url.into(),
                ..RunConfig::default()
            };
            assert!(
                matches!(config.plan(), Err(ConfigError::InvalidBaseUrl(_))),
                "{} should be rejected",
                url
            );
        }

        let config = RunConfig {
            tick_interval: Duration::ZERO,
            ..RunConfig::default()
        };
        assert!(matches!(config.plan(), Err(ConfigError::InvalidDuration { .. })));
    }

    #[test]
    fn overrides_layer_over_file_values() {
        let mut config = RunConfig::default();
        let overrides = ConfigOverrides {
            base_url: Some("https://staging.example".into()),
            stages: vec!["5s:2".into(), "5s:0".into()],
            thresholds: vec![
                "http_req_duration=p(95)<150".into(),
                "http_req_duration=avg<80".into(),
                "checks=rate>0.99".into(),
            ],
            think_time: Some("100-300ms".into()),
            request_timeout: Some("2s".into()),
            graceful_stop: None,
            abort_on_fail: true,
        };
        overrides.apply(&mut config).unwrap();

        assert_eq!(config.base_url(), "https://staging.example");
        assert_eq!(config.stages.len(), 2);
        assert_eq!(
            config.thresholds["http_req_duration"],
            vec!["p(95)<150".to_string(), "avg<80".to_string()]
        );
        assert_eq!(config.thresholds["http_req_failed"], vec!["rate<0.001".to_string()]);
        assert_eq!(config.thresholds["checks"], vec!["rate>0.99".to_string()]);
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.graceful_stop, Duration::from_secs(30));
        assert!(config.abort_on_fail);
        assert!(config.plan().is_ok());
    }

    #[test]
    fn rejects_malformed_overrides() {
        let mut config = RunConfig::default();
        let bad_threshold = ConfigOverrides {
            thresholds: vec!["http_req_duration".into()],
            ..ConfigOverrides::default()
        };
        assert!(matches!(
            bad_threshold.apply(&mut config),
            Err(ConfigError::InvalidThresholdOverride { .. })
        ));

        let bad_stage = ConfigOverrides {
            stages: vec!["ten:5".into()],
            ..ConfigOverrides::default()
        };
        assert!(matches!(
            bad_stage.apply(&mut config),
            Err(ConfigError::InvalidDuration { .. })
        ));
    }
}
