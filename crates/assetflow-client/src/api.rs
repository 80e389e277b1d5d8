//! The capability set the pipeline engine needs from the remote API.
//!
//! [`GenerationClient`](crate::GenerationClient) is the HTTP implementation;
//! tests substitute scripted ones.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::TaskRecord;

/// Remote generation API operations.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    /// Authenticated GET; returns the parsed JSON body.
    async fn get(&self, path: &str) -> Result<Value>;

    /// Authenticated POST of a JSON body; returns the parsed JSON body.
    async fn post(&self, path: &str, body: &Value) -> Result<Value>;

    /// Authenticated DELETE.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Follow a task's progress stream until it reaches a terminal status.
    ///
    /// If the stream ends first, the last record seen is returned.
    async fn stream_until_complete(&self, path: &str) -> Result<TaskRecord>;

    /// Poll a task until it reaches a terminal status or `timeout` elapses.
    async fn poll_until_complete(
        &self,
        path: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<TaskRecord>;

    /// Fetch an unauthenticated artifact URL into `target`, creating parent
    /// directories. Returns the number of bytes written.
    async fn download(&self, url: &str, target: &Path) -> Result<u64>;
}
