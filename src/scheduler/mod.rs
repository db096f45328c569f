pub mod profile;
pub mod runner;

pub use profile::{LoadProfile, LoadStage};
pub use runner::{
    AbortSignal, IterationInfo, IterationRunner, Scheduler, SchedulerOptions, SchedulerReport,
    StageObservation,
};
