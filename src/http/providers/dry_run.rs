/// Client that answers every request locally without network I/O.
use crate::error::AppError;
use crate::http::client::{HttpClient, HttpResponse};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Dry-run client.
///
/// Every request gets `status` after sleeping `latency`, which makes it useful
/// for rehearsing a load profile and for exercising the scheduler in tests.
pub struct DryRunClient {
    status: u16,
    latency: Duration,
    requests: AtomicU64,
}

impl DryRunClient {
    /// Create a client answering 200 immediately.
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Create a client answering with a fixed status.
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            latency: Duration::ZERO,
            requests: AtomicU64::new(0),
        }
    }

    /// Simulate a fixed service latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of requests answered so far.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    async fn respond(&self) -> HttpResponse {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        HttpResponse::new(self.status, self.latency)
    }
}

impl Default for DryRunClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HttpClient for DryRunClient {
    async fn get(&self, _url: &str) -> Result<HttpResponse, AppError> {
        Ok(self.respond().await)
    }

    async fn post(
        &self,
        _url: &str,
        _body: &Value,
        _headers: &[(String, String)],
    ) -> Result<HttpResponse, AppError> {
        Ok(self.respond().await)
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}
