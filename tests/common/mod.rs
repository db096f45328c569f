//! Shared helpers for integration tests.
#![allow(dead_code)]

use loadgate::error::AppError;
use loadgate::http::{HttpClient, HttpResponse};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Client that fails one path and answers 200 elsewhere.
pub struct ScriptedClient {
    failing_path: Option<(&'static str, u16)>,
    hanging_path: Option<(&'static str, Duration)>,
    latency: Duration,
    calls: AtomicU64,
}

impl ScriptedClient {
    pub fn healthy(latency: Duration) -> Self {
        Self {
            failing_path: None,
            hanging_path: None,
            latency,
            calls: AtomicU64::new(0),
        }
    }

    pub fn failing(path: &'static str, status: u16, latency: Duration) -> Self {
        Self {
            failing_path: Some((path, status)),
            ..Self::healthy(latency)
        }
    }

    /// Requests to `path` hang for `after` and then time out.
    pub fn timing_out(path: &'static str, after: Duration, latency: Duration) -> Self {
        Self {
            hanging_path: Some((path, after)),
            ..Self::healthy(latency)
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer(&self, url: &str) -> Result<HttpResponse, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((path, after)) = self.hanging_path {
            if url.contains(path) {
                tokio::time::sleep(after).await;
                return Err(AppError::Timeout(format!("{} timed out", url)));
            }
        }
        tokio::time::sleep(self.latency).await;
        let status = match self.failing_path {
            Some((path, status)) if url.contains(path) => status,
            _ => 200,
        };
        Ok(HttpResponse::new(status, self.latency))
    }
}

#[async_trait::async_trait]
impl HttpClient for ScriptedClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, AppError> {
        self.answer(url).await
    }

    async fn post(
        &self,
        url: &str,
        _body: &Value,
        _headers: &[(String, String)],
    ) -> Result<HttpResponse, AppError> {
        self.answer(url).await
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
