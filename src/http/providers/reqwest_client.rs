/// reqwest-backed HTTP client.
use crate::error::AppError;
use crate::http::client::{ClientConfig, HttpClient, HttpResponse};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Instant;

/// HTTP client talking to a real target service.
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> Result<Self, AppError> {
        let mut default_headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| AppError::Http(format!("Invalid header name '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AppError::Http(format!("Invalid header value for '{}': {}", key, e)))?;
            default_headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| AppError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn execute(&self, request: RequestBuilder, url: &str) -> Result<HttpResponse, AppError> {
        let start = Instant::now();

        let response = request.send().await.map_err(|e| classify(e, url))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify(e, url))?;

        Ok(HttpResponse {
            status,
            elapsed: start.elapsed(),
            body: Some(body),
        })
    }
}

fn classify(err: reqwest::Error, url: &str) -> AppError {
    if err.is_timeout() {
        AppError::Timeout(url.to_string())
    } else {
        AppError::Http(format!("Request to {} failed: {}", url, err))
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, AppError> {
        self.execute(self.client.get(url), url).await
    }

    async fn post(
        &self,
        url: &str,
        body: &Value,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, AppError> {
        let mut req = self.client.post(url);
        for (key, value) in headers {
            req = req.header(key, value);
        }
        // json() only sets Content-Type when the caller did not
        self.execute(req.json(body), url).await
    }

    fn name(&self) -> &str {
        "reqwest"
    }
}
