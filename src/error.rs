/// Error types for the loadgate crate.
use thiserror::Error;

/// Errors raised while loading or validating a run configuration.
///
/// All of these are reported before any load is generated.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Stage list is empty; at least one stage is required")]
    EmptyStages,

    #[error("Total stage duration is zero; nothing to run")]
    ZeroDuration,

    #[error("Invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("Invalid stage '{value}': expected DURATION:TARGET (e.g. 30s:10)")]
    InvalidStage { value: String },

    #[error("Invalid threshold override '{value}': expected METRIC=EXPRESSION")]
    InvalidThresholdOverride { value: String },

    #[error("Invalid base URL '{0}'")]
    InvalidBaseUrl(String),

    #[error("Threshold error: {0}")]
    Threshold(#[from] ThresholdError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors in threshold declarations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("Unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("Unknown tag '{tag}' on metric '{metric}'")]
    UnknownTag { metric: String, tag: String },

    #[error("Malformed metric selector '{0}'")]
    MalformedSelector(String),

    #[error("Cannot parse threshold expression '{expression}': {reason}")]
    Parse { expression: String, reason: String },

    #[error("Aggregation '{aggregation}' is not defined for metric '{metric}'")]
    UnsupportedAggregation { metric: String, aggregation: String },
}

/// Errors in a workflow definition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow has no steps")]
    Empty,

    #[error("Duplicate step name '{0}'")]
    DuplicateStep(String),

    #[error("Duplicate seed '{0}'")]
    DuplicateSeed(String),

    #[error("Step '{step}' has no expected status codes")]
    NoExpectedStatus { step: String },

    #[error("'{owner}' references '${{{var}}}' which is not defined before it")]
    UnboundVariable { owner: String, var: String },

    #[error("Step '{step}' uses '${{{var}}}' before step '{producer}' creates it")]
    DependencyOrder {
        step: String,
        var: String,
        producer: String,
    },

    #[error("Step '{step}' has invalid capture pointer '{pointer}'")]
    InvalidCapture { step: String, pointer: String },

    #[error("Unterminated placeholder in '{0}'")]
    UnterminatedPlaceholder(String),

    #[error("Empty placeholder '${{}}' in '{0}'")]
    EmptyPlaceholder(String),
}

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ThresholdError> for AppError {
    fn from(err: ThresholdError) -> Self {
        AppError::Config(ConfigError::Threshold(err))
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        AppError::Config(ConfigError::Workflow(err))
    }
}
