/// Per-iteration scenario: workflow definition, variable scope and executor.
pub mod context;
pub mod executor;
pub mod template;
pub mod workflow;

pub use context::ScenarioContext;
pub use executor::ScenarioExecutor;
pub use workflow::{Capture, Method, Seed, Step, Workflow};
