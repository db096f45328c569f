/// CLI argument parsing and command execution.
use crate::config::{ConfigOverrides, RunConfig, RunPlan};
use crate::config::duration::format_duration;
use crate::error::AppError;
use crate::http::providers::dry_run::DryRunClient;
use crate::http::{ClientConfig, HttpClientEnum};
use crate::output::{export_summary, CsvFormatter, Formatter, JsonFormatter, TextFormatter};
use crate::run::LoadTest;
use crate::scheduler::AbortSignal;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

/// loadgate - staged HTTP load tests with pass/fail thresholds.
#[derive(Parser, Debug)]
#[command(name = "loadgate")]
#[command(about = "Drive an HTTP service through a staged load profile and gate on thresholds")]
#[command(
    long_about = r#"loadgate - staged HTTP load tests with pass/fail thresholds

Runs a multi-step workflow against a target service while ramping virtual
users through a sequence of stages, then judges the run against latency and
error-rate thresholds.

EXIT CODES:
  0   all thresholds passed
  99  the run completed but a threshold failed
  1   configuration or runtime error

EXAMPLES:
  # Run the default profile against a local service
  loadgate run

  # Short smoke test with a custom ramp and a tighter latency bound
  loadgate run --stage 10s:5 --stage 20s:5 --stage 5s:0 \
      --threshold 'http_req_duration=p(95)<200'

  # Rehearse a profile without sending any requests
  loadgate run --config load.toml --dry-run

  # Check a configuration file without running it
  loadgate validate --config load.toml"#
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a load test
    Run(RunArgs),

    /// Validate a configuration and print the run plan
    Validate(ConfigArgs),
}

/// Configuration sources shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Target service root URL
    #[arg(long, env = "LOADGATE_BASE_URL")]
    pub base_url: Option<String>,

    /// Load stage as DURATION:TARGET (repeat to build a profile)
    #[arg(long = "stage", value_name = "DURATION:TARGET")]
    pub stages: Vec<String>,

    /// Threshold as METRIC=EXPRESSION (repeat; replaces that metric's list)
    #[arg(long = "threshold", value_name = "METRIC=EXPR")]
    pub thresholds: Vec<String>,

    /// Pause after each iteration (e.g. "1s" or "250-750ms")
    #[arg(long)]
    pub think_time: Option<String>,

    /// Per-request timeout (e.g. "60s")
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Time allowed for in-flight iterations once the profile ends
    #[arg(long, value_name = "DURATION")]
    pub graceful_stop: Option<String>,

    /// Abort the run as soon as a threshold is breached
    #[arg(long)]
    pub abort_on_fail: bool,
}

impl ConfigArgs {
    /// Load the file (or defaults) and apply command-line overrides.
    pub fn load(&self) -> Result<RunConfig, AppError> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };
        self.overrides().apply(&mut config)?;
        Ok(config)
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.base_url.clone(),
            stages: self.stages.clone(),
            thresholds: self.thresholds.clone(),
            think_time: self.think_time.clone(),
            request_timeout: self.timeout.clone(),
            graceful_stop: self.graceful_stop.clone(),
            abort_on_fail: self.abort_on_fail,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,

    /// Also write the JSON summary to this file
    #[arg(long, value_name = "FILE")]
    pub summary_export: Option<PathBuf>,

    /// Answer every request locally with 200 instead of contacting the target
    #[arg(long)]
    pub dry_run: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
    /// CSV output
    Csv,
}

impl Cli {
    /// Execute the CLI command and return the process exit code.
    pub fn run(self) -> Result<i32, AppError> {
        init_tracing(self.verbose);
        match self.command {
            Command::Run(args) => Self::run_load_test(args),
            Command::Validate(args) => Self::run_validate(args),
        }
    }

    fn run_load_test(args: RunArgs) -> Result<i32, AppError> {
        let config = args.config.load()?;
        let client = Arc::new(build_client(&config, args.dry_run)?);
        let test = LoadTest::new(config, client)?;

        let profile = &test.plan().profile;
        if args.dry_run {
            eprintln!("Dry run mode: no requests will reach the target");
        }
        eprintln!(
            "Starting load test: {} stages over {}, peak {} VUs",
            profile.stages().len(),
            format_duration(profile.total_duration()),
            profile.peak_target()
        );

        let progress_bar = if !args.quiet && args.output_format == OutputFormat::Text {
            let pb = indicatif::ProgressBar::new(profile.total_duration().as_millis() as u64);
            pb.set_style(
                indicatif::ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {percent}% {prefix} | {msg}")
                    .map_err(|e| AppError::Runtime(format!("Invalid progress template: {}", e)))?
                    .progress_chars("#>-"),
            );
            pb.set_message("Starting load test...");
            Some(Arc::new(pb))
        } else {
            None
        };

        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| AppError::Runtime(format!("Failed to create async runtime: {}", e)))?;

        let abort = AbortSignal::new();
        let report = rt.block_on(async {
            let on_interrupt = abort.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received; finishing in-flight iterations");
                    on_interrupt.abort();
                }
            });
            test.run_with_progress(abort, progress_bar).await
        });

        let formatter: Box<dyn Formatter> = match args.output_format {
            OutputFormat::Text => Box::new(TextFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::Csv => Box::new(CsvFormatter),
        };
        println!("{}", formatter.format(&report)?);

        if let Some(path) = &args.summary_export {
            export_summary(&report, path)?;
        }

        Ok(report.exit_code())
    }

    fn run_validate(args: ConfigArgs) -> Result<i32, AppError> {
        let config = args.load()?;
        let plan = config.plan()?;
        println!("{}", describe_plan(&config, &plan));
        Ok(0)
    }
}

/// Human-readable run plan printed by `validate`.
fn describe_plan(config: &RunConfig, plan: &RunPlan) -> String {
    let mut output = vec!["Configuration is valid".to_string()];
    output.push(format!("Target: {}", config.base_url()));
    output.push(format!(
        "Profile: {} over {}, peak {} VUs",
        plan.profile
            .stages()
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" -> "),
        format_duration(plan.profile.total_duration()),
        plan.profile.peak_target()
    ));
    output.push(format!("Think time: {}", config.think_time));
    output.push("Workflow:".to_string());
    for step in &plan.workflow.steps {
        output.push(format!(
            "  {} {} {} [{}]",
            step.method,
            step.path,
            step.name,
            step.check_label()
        ));
    }
    output.push("Thresholds:".to_string());
    for threshold in plan.thresholds.thresholds() {
        for expr in &threshold.expressions {
            output.push(format!("  {} {}", threshold.key, expr));
        }
    }
    output.join("\n")
}

fn build_client(config: &RunConfig, dry_run: bool) -> Result<HttpClientEnum, AppError> {
    if dry_run {
        return Ok(HttpClientEnum::DryRun(DryRunClient::new()));
    }
    let client_config = ClientConfig {
        timeout: config.request_timeout,
        headers: config
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    };
    reqwest_client(client_config)
}

#[cfg(feature = "reqwest-client")]
fn reqwest_client(config: ClientConfig) -> Result<HttpClientEnum, AppError> {
    use crate::http::providers::reqwest_client::ReqwestClient;
    Ok(HttpClientEnum::Reqwest(ReqwestClient::new(config)?))
}

#[cfg(not(feature = "reqwest-client"))]
fn reqwest_client(_config: ClientConfig) -> Result<HttpClientEnum, AppError> {
    Err(AppError::Http(
        "built without the reqwest-client feature; use --dry-run".to_string(),
    ))
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "loadgate=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
