/// Runs the workflow once per iteration and records every step.
use crate::config::ThinkTime;
use crate::http::{HttpClient, HttpResponse};
use crate::recorder::{OutcomeRecorder, RequestOutcome};
use crate::scenario::context::ScenarioContext;
use crate::scenario::workflow::{Method, Step, Workflow};
use crate::scheduler::{IterationInfo, IterationRunner};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Scenario executor bound to one client, workflow and recorder.
pub struct ScenarioExecutor<C: HttpClient> {
    client: Arc<C>,
    workflow: Arc<Workflow>,
    base_url: String,
    think_time: ThinkTime,
    recorder: Arc<OutcomeRecorder>,
    json_headers: Vec<(String, String)>,
}

impl<C: HttpClient + 'static> ScenarioExecutor<C> {
    /// Create an executor. `workflow` is expected to be validated already.
    pub fn new(
        client: Arc<C>,
        workflow: Arc<Workflow>,
        base_url: impl Into<String>,
        think_time: ThinkTime,
        recorder: Arc<OutcomeRecorder>,
    ) -> Self {
        Self {
            client,
            workflow,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            think_time,
            recorder,
            json_headers: vec![("Content-Type".to_string(), "application/json".to_string())],
        }
    }

    pub fn recorder(&self) -> &Arc<OutcomeRecorder> {
        &self.recorder
    }

    /// Run every step once, in order, recording one outcome per step.
    ///
    /// Nothing here fails the iteration: render errors, transport errors and
    /// unexpected statuses are recorded against their step and the remaining
    /// steps still run.
    pub async fn execute(&self, info: IterationInfo) {
        let mut ctx = match ScenarioContext::seed(info, &self.workflow.seeds) {
            Ok(ctx) => Some(ctx),
            Err(err) => {
                tracing::error!(vu = info.vu, iteration = info.iteration, error = %err, "seeding failed");
                None
            }
        };

        for step in &self.workflow.steps {
            let outcome = match ctx.as_mut() {
                Some(ctx) => self.run_step(step, ctx).await,
                None => self.failed(info, step, None, "iteration could not be seeded"),
            };
            self.recorder.record(outcome);
        }
    }

    async fn run_step(&self, step: &Step, ctx: &mut ScenarioContext) -> RequestOutcome {
        let info = ctx.info();

        let request = match self.render(step, ctx) {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!(step = %step.name, error = %err, "request could not be rendered");
                return self.failed(info, step, None, &err.to_string());
            }
        };
        let (url, body) = request;

        let started = Instant::now();
        let result = match step.method {
            Method::Get => self.client.get(&url).await,
            Method::Post => {
                let body = body.unwrap_or_else(|| Value::Object(Default::default()));
                self.client.post(&url, &body, &self.json_headers).await
            }
        };

        match result {
            Ok(response) => {
                let success = step.is_expected(response.status);
                if success {
                    apply_captures(step, &response, ctx);
                }
                let error = (!success).then(|| failure_detail(&response));
                if let Some(detail) = &error {
                    tracing::debug!(step = %step.name, vu = info.vu, detail = %detail, "check failed");
                }
                RequestOutcome {
                    vu: info.vu,
                    iteration: info.iteration,
                    step: step.name.clone(),
                    check: step.check_label().to_string(),
                    status: Some(response.status),
                    sent: true,
                    latency: response.elapsed,
                    success,
                    error,
                }
            }
            Err(err) => {
                tracing::debug!(step = %step.name, vu = info.vu, error = %err, "request failed");
                self.failed(info, step, Some(started.elapsed()), &err.to_string())
            }
        }
    }

    fn render(
        &self,
        step: &Step,
        ctx: &ScenarioContext,
    ) -> Result<(String, Option<Value>), crate::error::WorkflowError> {
        let path = ctx.render(&step.path, &step.name)?;
        let body = match &step.body {
            Some(body) => Some(ctx.render_json(body, &step.name)?),
            None => None,
        };
        Ok((format!("{}{}", self.base_url, path), body))
    }

    /// Outcome for a step that never received a response.
    ///
    /// `waited` is how long a sent request ran before the transport gave up,
    /// `None` when the request was never sent.
    fn failed(
        &self,
        info: IterationInfo,
        step: &Step,
        waited: Option<Duration>,
        detail: &str,
    ) -> RequestOutcome {
        RequestOutcome {
            vu: info.vu,
            iteration: info.iteration,
            step: step.name.clone(),
            check: step.check_label().to_string(),
            status: None,
            sent: waited.is_some(),
            latency: waited.unwrap_or_default(),
            success: false,
            error: Some(detail.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl<C: HttpClient + 'static> IterationRunner for ScenarioExecutor<C> {
    async fn run_iteration(&self, info: IterationInfo) {
        self.execute(info).await;
        tokio::time::sleep(self.think_time.sample()).await;
    }
}

fn apply_captures(step: &Step, response: &HttpResponse, ctx: &mut ScenarioContext) {
    if step.captures.is_empty() {
        return;
    }
    let body = response.json();
    for capture in &step.captures {
        let value = body.as_ref().and_then(|b| b.pointer(&capture.pointer));
        match value {
            Some(Value::String(s)) => ctx.set(&capture.var, s.as_str()),
            Some(Value::Number(n)) => ctx.set(&capture.var, n.to_string()),
            Some(Value::Bool(b)) => ctx.set(&capture.var, b.to_string()),
            _ => {
                // keep the locally generated value
                tracing::debug!(
                    step = %step.name,
                    var = %capture.var,
                    pointer = %capture.pointer,
                    "capture not found in response"
                );
            }
        }
    }
}

/// `unexpected status 409 (TEAM_EXISTS)` style detail for a failed check.
fn failure_detail(response: &HttpResponse) -> String {
    let code = response.json().and_then(|body| {
        body.pointer("/error/code")
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    match code {
        Some(code) => format!("unexpected status {} ({})", response.status, code),
        None => format!("unexpected status {}", response.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::http::providers::dry_run::DryRunClient;
    use crate::scenario::workflow::Seed;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Answers from a per-path table and remembers every request.
    struct TableClient {
        responses: Vec<(&'static str, u16, Option<&'static str>)>,
        seen: Mutex<Vec<(String, Option<Value>)>>,
    }

    impl TableClient {
        fn new(responses: Vec<(&'static str, u16, Option<&'static str>)>) -> Self {
            Self {
                responses,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn respond(&self, url: &str) -> Result<HttpResponse, AppError> {
            let (_, status, body) = self
                .responses
                .iter()
                .find(|(path, _, _)| url.contains(path))
                .copied()
                .unwrap_or(("", 200, None));
            if status == 0 {
                return Err(AppError::Http("connection refused".into()));
            }
            let response = HttpResponse::new(status, Duration::from_millis(3));
            Ok(match body {
                Some(body) => response.with_body(body),
                None => response,
            })
        }
    }

    #[async_trait::async_trait]
    impl HttpClient for TableClient {
        async fn get(&self, url: &str) -> Result<HttpResponse, AppError> {
            self.seen.lock().push((url.to_string(), None));
            self.respond(url)
        }

        async fn post(
            &self,
            url: &str,
            body: &Value,
            headers: &[(String, String)],
        ) -> Result<HttpResponse, AppError> {
            assert!(headers.iter().any(|(k, v)| k == "Content-Type" && v == "application/json"));
            self.seen.lock().push((url.to_string(), Some(body.clone())));
            self.respond(url)
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    fn executor<C: HttpClient + 'static>(client: Arc<C>, workflow: Workflow) -> ScenarioExecutor<C> {
        ScenarioExecutor::new(
            client,
            Arc::new(workflow),
            "http://svc.test/",
            ThinkTime::fixed(Duration::ZERO),
            Arc::new(OutcomeRecorder::new()),
        )
    }

    fn info() -> IterationInfo {
        IterationInfo { vu: 1, iteration: 0 }
    }

    #[tokio::test]
    async fn healthy_service_passes_every_step() {
        let exec = executor(Arc::new(DryRunClient::new()), Workflow::reviewer_flow());
        exec.execute(info()).await;

        let outcomes = exec.recorder().snapshot();
        assert_eq!(outcomes.len(), 7);
        assert!(outcomes.iter().all(|o| o.success && o.status == Some(200)));
        assert_eq!(outcomes[1].check, "team created");
    }

    #[tokio::test]
    async fn payloads_thread_iteration_identifiers() {
        let client = Arc::new(TableClient::new(Vec::new()));
        let exec = executor(client.clone(), Workflow::reviewer_flow());
        exec.execute(info()).await;

        let seen = client.seen.lock().clone();
        assert_eq!(seen.len(), 7);
        assert_eq!(seen[0].0, "http://svc.test/health");

        let team = seen[1].1.as_ref().unwrap();
        let team_name = team["team_name"].as_str().unwrap();
        let team_id = team_name.strip_prefix("team_").unwrap();
        assert_eq!(team["members"][0]["username"], json!(format!("alice_{}", team_id)));
        assert_eq!(team["members"][0]["is_active"], json!(true));
        assert_eq!(seen[2].0, format!("http://svc.test/team/get?team_name={}", team_name));

        let user_1 = team["members"][0]["user_id"].clone();
        let user_2 = team["members"][1]["user_id"].clone();
        let user_3 = team["members"][2]["user_id"].as_str().unwrap().to_string();
        assert_eq!(seen[3].1.as_ref().unwrap()["user_id"], user_1);
        assert_eq!(seen[3].1.as_ref().unwrap()["is_active"], json!(false));

        let pr = seen[4].1.as_ref().unwrap();
        assert_eq!(pr["author_id"], user_2);
        assert_eq!(
            pr["pull_request_name"],
            json!(format!("Feature: Add new API endpoint {}", team_id))
        );
        assert_eq!(seen[5].0, format!("http://svc.test/users/getReview?user_id={}", user_3));
        assert_eq!(seen[6].1.as_ref().unwrap()["pull_request_id"], pr["pull_request_id"]);
    }

    #[tokio::test]
    async fn failed_step_does_not_stop_iteration() {
        let client = Arc::new(TableClient::new(vec![(
            "/team/add",
            500,
            Some(r#"{"error":{"code":"INTERNAL","message":"boom"}}"#),
        )]));
        let exec = executor(client.clone(), Workflow::reviewer_flow());
        exec.execute(info()).await;

        let outcomes = exec.recorder().snapshot();
        assert_eq!(outcomes.len(), 7);
        assert_eq!(client.seen.lock().len(), 7);

        let create = outcomes.iter().find(|o| o.step == "create_team").unwrap();
        assert!(!create.success);
        assert_eq!(create.status, Some(500));
        assert_eq!(create.error.as_deref(), Some("unexpected status 500 (INTERNAL)"));
        assert_eq!(outcomes.iter().filter(|o| o.success).count(), 6);
    }

    #[tokio::test]
    async fn transport_errors_record_missing_status() {
        let client = Arc::new(TableClient::new(vec![("/health", 0, None)]));
        let exec = executor(client, Workflow::reviewer_flow());
        exec.execute(info()).await;

        let outcomes = exec.recorder().snapshot();
        assert_eq!(outcomes.len(), 7);
        assert_eq!(outcomes[0].status, None);
        assert!(outcomes[0].sent);
        assert!(!outcomes[0].success);
        assert!(outcomes[0].error.as_deref().unwrap().contains("connection refused"));
        assert!(outcomes[1..].iter().all(|o| o.success));
    }

    #[tokio::test]
    async fn captured_identifier_replaces_seed() {
        let client = Arc::new(TableClient::new(vec![(
            "/pullRequest/create",
            201,
            Some(r#"{"pr":{"pull_request_id":"pr_from_server"}}"#),
        )]));
        let exec = executor(client.clone(), Workflow::reviewer_flow());
        exec.execute(info()).await;

        let seen = client.seen.lock().clone();
        assert_eq!(
            seen[6].1.as_ref().unwrap()["pull_request_id"],
            json!("pr_from_server")
        );
    }

    #[tokio::test]
    async fn unrenderable_step_fails_alone() {
        let workflow = Workflow {
            seeds: vec![Seed::new("id", "${uuid}")],
            steps: vec![
                Step::get("first", "/a/${id}"),
                Step::get("broken", "/b/${later}"),
                Step::get("last", "/c"),
            ],
        };
        let client = Arc::new(TableClient::new(Vec::new()));
        let exec = executor(client.clone(), workflow);
        exec.execute(info()).await;

        let outcomes = exec.recorder().snapshot();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
        assert_eq!(outcomes[1].status, None);
        assert!(!outcomes[1].sent);
        assert_eq!(outcomes[1].latency, Duration::ZERO);
        assert!(outcomes[2].success);
        assert_eq!(client.seen.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn iteration_ends_with_think_time() {
        let exec = ScenarioExecutor::new(
            Arc::new(DryRunClient::new()),
            Arc::new(Workflow::reviewer_flow()),
            "http://svc.test",
            ThinkTime::fixed(Duration::from_secs(1)),
            Arc::new(OutcomeRecorder::new()),
        );
        let start = Instant::now();
        exec.run_iteration(info()).await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }
}
