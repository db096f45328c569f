/// Per-iteration variable scope.
use crate::error::WorkflowError;
use crate::ids;
use crate::scenario::template::{self, UUID_VAR};
use crate::scenario::workflow::Seed;
use crate::scheduler::IterationInfo;
use serde_json::Value;
use std::collections::HashMap;

/// Variables owned by one iteration of one virtual user.
///
/// Built from the workflow's seeds when the iteration starts and dropped when
/// it ends, so no identifier is ever shared between iterations.
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    info: IterationInfo,
    vars: HashMap<String, String>,
}

impl ScenarioContext {
    /// Evaluate `seeds` in order.
    pub fn seed(info: IterationInfo, seeds: &[Seed]) -> Result<Self, WorkflowError> {
        let mut ctx = Self {
            info,
            vars: HashMap::with_capacity(seeds.len()),
        };
        for seed in seeds {
            let value = ctx.render(&seed.template, &seed.var)?;
            ctx.vars.insert(seed.var.clone(), value);
        }
        Ok(ctx)
    }

    pub fn info(&self) -> IterationInfo {
        self.info
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.vars.insert(name.to_string(), value.into());
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if name == UUID_VAR {
            return Some(ids::generate());
        }
        self.vars.get(name).cloned()
    }

    /// Expand a string template against this context.
    pub fn render(&self, text: &str, owner: &str) -> Result<String, WorkflowError> {
        template::render(text, owner, |name| self.lookup(name))
    }

    /// Expand a JSON template against this context.
    pub fn render_json(&self, value: &Value, owner: &str) -> Result<Value, WorkflowError> {
        template::render_json(value, owner, &mut |name: &str| self.lookup(name))
    }
}
