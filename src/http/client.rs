/// HTTP client abstraction used by the scenario executor.
use crate::error::AppError;
use serde_json::Value;
use std::time::Duration;

/// Observed response of a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Time from sending the request until the body was received
    pub elapsed: Duration,
    /// Response body, when one was read
    pub body: Option<String>,
}

impl HttpResponse {
    /// Create a response without a body.
    pub fn new(status: u16, elapsed: Duration) -> Self {
        Self {
            status,
            elapsed,
            body: None,
        }
    }

    /// Attach a body to the response.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Parse the body as JSON, if present and well-formed.
    pub fn json(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|body| serde_json::from_str(body).ok())
    }
}

/// Trait for HTTP collaborators.
///
/// Implementations own connection handling and timeouts. A transport failure
/// (refused connection, DNS, timeout) is returned as `Err`; any received
/// response, whatever its status, is `Ok`.
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// Issue a GET request.
    async fn get(&self, url: &str) -> Result<HttpResponse, AppError>;

    /// Issue a POST request with a JSON body and extra headers.
    async fn post(
        &self,
        url: &str,
        body: &Value,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, AppError>;

    /// Get the client name.
    fn name(&self) -> &str;
}

/// Enum wrapper for the available clients.
pub enum HttpClientEnum {
    #[cfg(feature = "reqwest-client")]
    Reqwest(crate::http::providers::reqwest_client::ReqwestClient),
    DryRun(crate::http::providers::dry_run::DryRunClient),
}

#[async_trait::async_trait]
impl HttpClient for HttpClientEnum {
    async fn get(&self, url: &str) -> Result<HttpResponse, AppError> {
        match self {
            #[cfg(feature = "reqwest-client")]
            HttpClientEnum::Reqwest(client) => client.get(url).await,
            HttpClientEnum::DryRun(client) => client.get(url).await,
        }
    }

    async fn post(
        &self,
        url: &str,
        body: &Value,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, AppError> {
        match self {
            #[cfg(feature = "reqwest-client")]
            HttpClientEnum::Reqwest(client) => client.post(url, body, headers).await,
            HttpClientEnum::DryRun(client) => client.post(url, body, headers).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            #[cfg(feature = "reqwest-client")]
            HttpClientEnum::Reqwest(client) => client.name(),
            HttpClientEnum::DryRun(client) => client.name(),
        }
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// Headers sent with every request
    pub headers: Vec<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            headers: Vec::new(),
        }
    }
}
