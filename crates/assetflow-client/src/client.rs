//! Main client implementation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderValue};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::api::GenerationApi;
use crate::error::{ApiError, ErrorResponse, Result};
use crate::retry::with_retry;
use crate::sse::SseParser;
use crate::types::TaskRecord;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.meshy.ai/openapi";

/// Default timeout for plain requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default absolute timeout for a progress stream.
const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(600);

/// Default number of retries after a rate-limited request.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay between retries.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Client for the remote generation API.
///
/// # Example
///
/// ```no_run
/// use assetflow_client::{GenerationApi, GenerationClient};
/// use serde_json::json;
///
/// # async fn example() -> assetflow_client::Result<()> {
/// let client = GenerationClient::builder().api_key("msy-...").build()?;
///
/// let created = client.post("/v2/text-to-3d", &json!({"prompt": "a barrel"})).await?;
/// let id = created["result"].as_str().unwrap_or_default();
/// let done = client.stream_until_complete(&format!("/v2/text-to-3d/{id}/stream")).await?;
/// println!("{}", done.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GenerationClient {
    inner: Arc<ClientInner>,
}

/// Inner client state (shared across clones).
struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    timeout: Duration,
    stream_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("timeout", &self.inner.timeout)
            .field("stream_timeout", &self.inner.stream_timeout)
            .field("max_retries", &self.inner.max_retries)
            .finish_non_exhaustive()
    }
}

impl GenerationClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal HTTP methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a URL for an API path.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        let path = path.trim_start_matches('/');
        self.inner.base_url.join(path).map_err(ApiError::from)
    }

    /// Send an authenticated JSON request, retrying on rate limits.
    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.url(path)?;
        debug!(method = %method, url = %url, "API request");

        with_retry(self.inner.max_retries, self.inner.retry_delay, || {
            let mut builder = self
                .inner
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(&self.inner.api_key)
                .timeout(self.inner.timeout);
            if let Some(body) = body {
                builder = builder.json(body);
            }
            async move {
                let response = builder.send().await?;
                Self::handle_response(response).await
            }
        })
        .await
    }

    /// Handle a response, extracting the body or error.
    async fn handle_response(response: reqwest::Response) -> Result<Value> {
        if !response.status().is_success() {
            return Err(Self::extract_error(response).await);
        }
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Extract an error from a failed response.
    async fn extract_error(response: reqwest::Response) -> ApiError {
        let status = response.status();
        let fallback = status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

        let message = match response.text().await {
            Ok(body) => serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or(fallback),
            Err(_) => fallback,
        };

        ApiError::from_status(status.as_u16(), message)
    }

    /// Read the progress stream until a terminal record or end of stream.
    async fn consume_stream(&self, url: Url) -> Result<TaskRecord> {
        let response = self
            .inner
            .http
            .get(url)
            .bearer_auth(&self.inner.api_key)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::extract_error(response).await);
        }

        let mut parser = SseParser::new();
        let mut last: Option<TaskRecord> = None;
        let mut bytes = response.bytes_stream();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk?;
            for record in parser.push(&chunk) {
                if record.status.is_terminal() {
                    return Ok(record);
                }
                debug!(status = %record.status, progress = ?record.progress, "Task progress");
                last = Some(record);
            }
        }

        if let Some(record) = parser.finish() {
            if record.status.is_terminal() {
                return Ok(record);
            }
            last = Some(record);
        }

        match last {
            Some(record) => {
                warn!(status = %record.status, "Stream ended before a terminal status");
                Ok(record)
            }
            None => Err(ApiError::EmptyStream),
        }
    }
}

#[async_trait]
impl GenerationApi for GenerationClient {
    async fn get(&self, path: &str) -> Result<Value> {
        self.request(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.request(Method::DELETE, path, None).await.map(|_| ())
    }

    async fn stream_until_complete(&self, path: &str) -> Result<TaskRecord> {
        let url = self.url(path)?;
        let limit = self.inner.stream_timeout;
        match tokio::time::timeout(limit, self.consume_stream(url)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(format!(
                "stream {} exceeded {}ms",
                path,
                limit.as_millis()
            ))),
        }
    }

    async fn poll_until_complete(
        &self,
        path: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<TaskRecord> {
        let poll = async {
            loop {
                let record = TaskRecord::from_value(self.get(path).await?)?;
                if record.status.is_terminal() {
                    return Ok::<_, ApiError>(record);
                }
                debug!(status = %record.status, progress = ?record.progress, "Task progress");
                tokio::time::sleep(interval).await;
            }
        };
        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(format!(
                "polling {} exceeded {}ms",
                path,
                timeout.as_millis()
            ))),
        }
    }

    async fn download(&self, url: &str, target: &Path) -> Result<u64> {
        let parsed = Url::parse(url)?;
        // Artifact URLs are pre-signed; no credentials are attached.
        let response = self
            .inner
            .http
            .get(parsed)
            .timeout(self.inner.stream_timeout)
            .send()
            .await
            .map_err(|e| ApiError::Download {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Download {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(target).await?;
        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ApiError::Download {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(url, path = %target.display(), bytes = written, "Downloaded artifact");
        Ok(written)
    }
}

/// Builder for creating a [`GenerationClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    stream_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    user_agent: Option<String>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            user_agent: None,
        }
    }

    /// Set the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the API key sent as a bearer token.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the absolute timeout for a progress stream.
    pub fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    /// Set the number of retries after a rate-limited request.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base delay between retries.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<GenerationClient> {
        let api_key = self
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ApiError::Config("api_key is required".to_string()))?;

        // Parse and normalize base URL
        let mut base_url = Url::parse(self.base_url.trim_end_matches('/'))?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("assetflow-client/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder().user_agent(user_agent).build()?;

        Ok(GenerationClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                api_key,
                timeout: self.timeout,
                stream_timeout: self.stream_timeout,
                max_retries: self.max_retries,
                retry_delay: self.retry_delay,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
