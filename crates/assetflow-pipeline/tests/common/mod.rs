//! Common test utilities for runner integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assetflow_client::{ApiError, GenerationApi, TaskRecord};
use assetflow_pipeline::{
    AssetManifest, DefinitionBundle, PipelineDefinition, PipelineRunner, TaskDefinition,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

/// A call made against [`MockApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Get(String),
    Post(String, Value),
    Delete(String),
    Stream(String),
    Poll(String),
    Download(String, PathBuf),
}

/// Scripted in-memory generation API.
///
/// Every POST creates task `task-N`. Its final record comes from the queue
/// scripted for the create path; the last scripted record is reused once the
/// queue is down to one. A GET on a path containing a known task id returns
/// that task's record unless a response was set for the exact path.
#[derive(Default)]
pub struct MockApi {
    calls: Mutex<Vec<Call>>,
    scripts: Mutex<HashMap<String, VecDeque<Value>>>,
    tasks: Mutex<HashMap<String, Value>>,
    gets: Mutex<HashMap<String, Value>>,
    failing_downloads: Mutex<HashSet<String>>,
    next_id: Mutex<u32>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a final record for tasks created at `create_path`.
    pub fn finish(&self, create_path: &str, record: Value) {
        self.scripts
            .lock()
            .unwrap()
            .entry(create_path.to_string())
            .or_default()
            .push_back(record);
    }

    /// Queue a successful record with flat response fields.
    pub fn succeed(&self, create_path: &str, fields: Value) {
        let mut record = json!({"status": "SUCCEEDED", "progress": 100});
        if let (Some(record), Value::Object(fields)) = (record.as_object_mut(), fields) {
            record.extend(fields);
        }
        self.finish(create_path, record);
    }

    /// Answer GETs of `path` with `body`.
    pub fn set_get(&self, path: &str, body: Value) {
        self.gets.lock().unwrap().insert(path.to_string(), body);
    }

    /// Make downloads of `url` fail.
    pub fn fail_download(&self, url: &str) {
        self.failing_downloads.lock().unwrap().insert(url.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// POST calls as `(path, body)`.
    pub fn posts(&self) -> Vec<(String, Value)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Post(path, body) => Some((path, body)),
                _ => None,
            })
            .collect()
    }

    /// Downloaded URLs in order.
    pub fn downloads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Download(url, _) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn gets(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Get(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn task_for(&self, path: &str) -> Option<Value> {
        let tasks = self.tasks.lock().unwrap();
        path.split('/').find_map(|segment| tasks.get(segment).cloned())
    }

    fn finished(&self, path: &str) -> assetflow_client::Result<TaskRecord> {
        let record = self.task_for(path).ok_or_else(|| ApiError::Api {
            status: 404,
            message: format!("no task for {}", path),
        })?;
        Ok(TaskRecord::from_value(record)?)
    }
}

#[async_trait]
impl GenerationApi for MockApi {
    async fn get(&self, path: &str) -> assetflow_client::Result<Value> {
        self.record(Call::Get(path.to_string()));
        if let Some(body) = self.gets.lock().unwrap().get(path) {
            return Ok(body.clone());
        }
        self.task_for(path).ok_or_else(|| ApiError::Api {
            status: 404,
            message: format!("no task for {}", path),
        })
    }

    async fn post(&self, path: &str, body: &Value) -> assetflow_client::Result<Value> {
        self.record(Call::Post(path.to_string(), body.clone()));

        let task_id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("task-{}", *next)
        };

        let mut record = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(path) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        }
        .unwrap_or_else(|| json!({"status": "SUCCEEDED", "result": {}}));
        if let Some(map) = record.as_object_mut() {
            map.insert("id".to_string(), Value::String(task_id.clone()));
        }
        self.tasks.lock().unwrap().insert(task_id.clone(), record);

        Ok(json!({"result": task_id}))
    }

    async fn delete(&self, path: &str) -> assetflow_client::Result<()> {
        self.record(Call::Delete(path.to_string()));
        Ok(())
    }

    async fn stream_until_complete(&self, path: &str) -> assetflow_client::Result<TaskRecord> {
        self.record(Call::Stream(path.to_string()));
        self.finished(path)
    }

    async fn poll_until_complete(
        &self,
        path: &str,
        _interval: Duration,
        _timeout: Duration,
    ) -> assetflow_client::Result<TaskRecord> {
        self.record(Call::Poll(path.to_string()));
        self.finished(path)
    }

    async fn download(&self, url: &str, target: &Path) -> assetflow_client::Result<u64> {
        self.record(Call::Download(url.to_string(), target.to_path_buf()));
        if self.failing_downloads.lock().unwrap().contains(url) {
            return Err(ApiError::Download {
                url: url.to_string(),
                reason: "HTTP 404".to_string(),
            });
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = format!("bytes of {}", url);
        std::fs::write(target, &content)?;
        Ok(content.len() as u64)
    }
}

/// An asset directory holding `manifest`.
pub fn asset_dir(manifest: Value) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        AssetManifest::path_in(dir.path()),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();
    dir
}

/// Read the manifest back from disk.
pub fn read_manifest(dir: &Path) -> AssetManifest {
    AssetManifest::load(&AssetManifest::path_in(dir)).unwrap()
}

/// Build a bundle from JSON documents.
pub fn bundle(tasks: &[Value], pipelines: &[Value]) -> DefinitionBundle {
    let mut bundle = DefinitionBundle::new();
    for task in tasks {
        bundle.insert_task(TaskDefinition::from_json(&task.to_string()).unwrap());
    }
    for pipeline in pipelines {
        bundle.insert_pipeline(PipelineDefinition::from_json(&pipeline.to_string()).unwrap());
    }
    bundle
}

/// A runner over `api` with an empty environment.
pub fn runner(bundle: DefinitionBundle, api: &Arc<MockApi>) -> PipelineRunner {
    PipelineRunner::new(bundle, api.clone() as Arc<dyn GenerationApi>).with_env(HashMap::new())
}
