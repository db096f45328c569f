/// Declarative workflow: seed variables plus an ordered list of request steps.
use crate::error::WorkflowError;
use crate::scenario::template::{self, UUID_VAR};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Variable computed once at iteration start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Seed {
    pub var: String,
    /// May reference `${uuid}` and earlier seeds
    pub template: String,
}

impl Seed {
    pub fn new(var: &str, template: &str) -> Self {
        Self {
            var: var.to_string(),
            template: template.to_string(),
        }
    }
}

/// Value read from a successful response into a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Capture {
    pub var: String,
    /// JSON pointer into the response body, e.g. `/pr/pull_request_id`
    pub pointer: String,
}

fn default_expect() -> Vec<u16> {
    vec![200]
}

/// One request of the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    pub name: String,
    /// Check label reported for this step; defaults to the step name
    #[serde(default)]
    pub check: Option<String>,
    #[serde(default)]
    pub method: Method,
    /// Path template appended to the base URL
    pub path: String,
    /// JSON body template for POST requests
    #[serde(default)]
    pub body: Option<Value>,
    /// Statuses counted as success
    #[serde(default = "default_expect")]
    pub expect: Vec<u16>,
    /// Variables naming remote entities this step creates
    #[serde(default)]
    pub produces: Vec<String>,
    #[serde(default)]
    pub captures: Vec<Capture>,
}

impl Step {
    pub fn get(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            check: None,
            method: Method::Get,
            path: path.to_string(),
            body: None,
            expect: default_expect(),
            produces: Vec::new(),
            captures: Vec::new(),
        }
    }

    pub fn post(name: &str, path: &str, body: Value) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            ..Self::get(name, path)
        }
    }

    pub fn check(mut self, label: &str) -> Self {
        self.check = Some(label.to_string());
        self
    }

    pub fn expect(mut self, statuses: &[u16]) -> Self {
        self.expect = statuses.to_vec();
        self
    }

    pub fn produces(mut self, vars: &[&str]) -> Self {
        self.produces = vars.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn capture(mut self, var: &str, pointer: &str) -> Self {
        self.captures.push(Capture {
            var: var.to_string(),
            pointer: pointer.to_string(),
        });
        self
    }

    pub fn check_label(&self) -> &str {
        self.check.as_deref().unwrap_or(&self.name)
    }

    pub fn is_expected(&self, status: u16) -> bool {
        self.expect.contains(&status)
    }

    /// Placeholders referenced by the path and body.
    fn references(&self) -> Result<Vec<&str>, WorkflowError> {
        let mut names = template::placeholders(&self.path)?;
        if let Some(body) = &self.body {
            for text in template::json_strings(body) {
                names.extend(template::placeholders(text)?);
            }
        }
        Ok(names)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Workflow {
    #[serde(default)]
    pub seeds: Vec<Seed>,
    pub steps: Vec<Step>,
}

impl Workflow {
    /// Check the workflow's dependency graph.
    ///
    /// Seeds may use `${uuid}` and earlier seeds. A step may use seeds and
    /// values captured by earlier steps, and must come after every step that
    /// produces a variable it references.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.steps.is_empty() {
            return Err(WorkflowError::Empty);
        }

        let mut defined: HashSet<&str> = HashSet::new();
        for seed in &self.seeds {
            if seed.var == UUID_VAR || defined.contains(seed.var.as_str()) {
                return Err(WorkflowError::DuplicateSeed(seed.var.clone()));
            }
            for name in template::placeholders(&seed.template)? {
                if name != UUID_VAR && !defined.contains(name) {
                    return Err(WorkflowError::UnboundVariable {
                        owner: seed.var.clone(),
                        var: name.to_string(),
                    });
                }
            }
            defined.insert(&seed.var);
        }

        // first producer of each variable
        let mut producers: HashMap<&str, usize> = HashMap::new();
        for (index, step) in self.steps.iter().enumerate() {
            let produced = step
                .produces
                .iter()
                .chain(step.captures.iter().map(|c| &c.var));
            for var in produced {
                producers.entry(var.as_str()).or_insert(index);
            }
        }

        let mut names: HashSet<&str> = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if !names.insert(&step.name) {
                return Err(WorkflowError::DuplicateStep(step.name.clone()));
            }
            if step.expect.is_empty() {
                return Err(WorkflowError::NoExpectedStatus {
                    step: step.name.clone(),
                });
            }
            for capture in &step.captures {
                if !capture.pointer.is_empty() && !capture.pointer.starts_with('/') {
                    return Err(WorkflowError::InvalidCapture {
                        step: step.name.clone(),
                        pointer: capture.pointer.clone(),
                    });
                }
            }

            for name in step.references()? {
                if name == UUID_VAR {
                    continue;
                }
                if let Some(&producer) = producers.get(name) {
                    if producer > index {
                        return Err(WorkflowError::DependencyOrder {
                            step: step.name.clone(),
                            var: name.to_string(),
                            producer: self.steps[producer].name.clone(),
                        });
                    }
                }
                if !defined.contains(name) {
                    return Err(WorkflowError::UnboundVariable {
                        owner: step.name.clone(),
                        var: name.to_string(),
                    });
                }
            }

            for var in &step.produces {
                let captured_here = step.captures.iter().any(|c| &c.var == var);
                if !defined.contains(var.as_str()) && !captured_here {
                    return Err(WorkflowError::UnboundVariable {
                        owner: step.name.clone(),
                        var: var.clone(),
                    });
                }
            }
            defined.extend(step.captures.iter().map(|c| c.var.as_str()));
        }

        Ok(())
    }

    /// Team / pull-request review workflow run by default.
    pub fn reviewer_flow() -> Self {
        let seeds = vec![
            Seed::new("team_id", "${uuid}"),
            Seed::new("team_name", "team_${team_id}"),
            Seed::new("user_1", "user_${uuid}_1"),
            Seed::new("user_2", "user_${uuid}_2"),
            Seed::new("user_3", "user_${uuid}_3"),
            Seed::new("pr_id", "pr_${uuid}"),
        ];

        let member = |user: &str, name: &str| {
            json!({
                "user_id": format!("${{{}}}", user),
                "username": format!("{}_${{team_id}}", name),
                "is_active": true,
            })
        };

        let steps = vec![
            Step::get("health", "/health").check("status is 200"),
            Step::post(
                "create_team",
                "/team/add",
                json!({
                    "team_name": "${team_name}",
                    "members": [
                        member("user_1", "alice"),
                        member("user_2", "bob"),
                        member("user_3", "charlie"),
                    ],
                }),
            )
            .check("team created")
            .expect(&[200, 201])
            .produces(&["team_name", "user_1", "user_2", "user_3"]),
            Step::get("get_team", "/team/get?team_name=${team_name}").check("team fetched"),
            Step::post(
                "deactivate_user",
                "/users/setIsActive",
                json!({ "user_id": "${user_1}", "is_active": false }),
            )
            .check("user status updated"),
            Step::post(
                "create_pr",
                "/pullRequest/create",
                json!({
                    "pull_request_id": "${pr_id}",
                    "pull_request_name": "Feature: Add new API endpoint ${team_id}",
                    "author_id": "${user_2}",
                }),
            )
            .check("PR created")
            .expect(&[200, 201])
            .produces(&["pr_id"])
            .capture("pr_id", "/pr/pull_request_id"),
            Step::get("get_review", "/users/getReview?user_id=${user_3}").check("review fetched"),
            Step::post(
                "merge_pr",
                "/pullRequest/merge",
                json!({ "pull_request_id": "${pr_id}" }),
            )
            .check("PR merged"),
        ];

        Self { seeds, steps }
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self::reviewer_flow()
    }
}
