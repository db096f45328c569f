/// loadgate library - exposes modules for testing and external use.
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod ids;
pub mod output;
pub mod recorder;
pub mod report;
pub mod run;
pub mod scenario;
pub mod scheduler;
pub mod thresholds;
