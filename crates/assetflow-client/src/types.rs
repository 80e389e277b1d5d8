//! Remote task records.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status of a remote generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Canceled,
    /// Missing or unrecognized status string.
    #[default]
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Canceled => "CANCELED",
            TaskStatus::Unknown => "UNKNOWN",
        }
    }

    /// Whether the task has stopped progressing.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled
        )
    }

    /// Whether the task finished unsuccessfully.
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::Canceled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error detail attached to a failed task. The service sends
/// `{"message": null}` on tasks that have not failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

/// `null` reads as `Unknown` rather than failing the whole record.
fn nullable_status<'de, D>(deserializer: D) -> Result<TaskStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<TaskStatus>::deserialize(deserializer)?.unwrap_or_default())
}

/// A snapshot of a remote task, as delivered by the progress stream or a
/// task fetch.
///
/// Fields the client does not model are kept in `extra` so response paths
/// can reach them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "nullable_status")]
    pub status: TaskStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_error: Option<TaskErrorDetail>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskRecord {
    /// Parse a record from an arbitrary JSON value.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// The whole record as a JSON object.
    pub fn to_value(&self) -> Value {
        let mut map = self.extra.clone();
        if let Some(ref id) = self.id {
            map.insert("id".to_string(), Value::String(id.clone()));
        }
        map.insert(
            "status".to_string(),
            Value::String(self.status.as_str().to_string()),
        );
        if let Some(progress) = self.progress
            && let Some(n) = serde_json::Number::from_f64(progress)
        {
            map.insert("progress".to_string(), Value::Number(n));
        }
        if let Some(ref result) = self.result {
            map.insert("result".to_string(), result.clone());
        }
        if let Some(ref err) = self.task_error {
            let mut detail = Map::new();
            let message = err.message.clone().map_or(Value::Null, Value::String);
            detail.insert("message".to_string(), message);
            map.insert("task_error".to_string(), Value::Object(detail));
        }
        Value::Object(map)
    }

    /// The value response paths are evaluated against: `result` when
    /// present, otherwise the whole record.
    pub fn payload(&self) -> Value {
        match self.result {
            Some(ref result) => result.clone(),
            None => self.to_value(),
        }
    }

    /// Error message reported by the remote side, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.task_error
            .as_ref()
            .and_then(|e| e.message.as_deref())
            .filter(|m| !m.is_empty())
    }
}
