use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowcore::{EventBus, ExecutionEvent, ExecutionId, RunId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
    Canceled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub run_id: RunId,
    pub node_id: String,
    pub status: Option<TaskStatus>,
    pub inputs: Option<serde_json::Value>,
    pub outputs: Option<serde_json::Value>,
    pub subworkflow: Option<serde_json::Value>,
    pub subworkflow_output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub is_downstream_of_pause: bool,
    pub timestamp: DateTime<Utc>,
}

/// Records per-node task state over the course of a run, the way the
/// executor this engine is modeled on persists a task row per node
/// invocation. Separate from `RunStore`, which only tracks run-level status.
#[async_trait]
pub trait TaskRecorder: Send + Sync {
    async fn create_task(&self, run_id: RunId, node_id: &str);
    async fn update_task(&self, update: TaskUpdate);
}

#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub status: TaskStatus,
    pub inputs: Option<serde_json::Value>,
    pub outputs: Option<serde_json::Value>,
    pub subworkflow: Option<serde_json::Value>,
    pub subworkflow_output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub is_downstream_of_pause: bool,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    fn pending(updated_at: DateTime<Utc>) -> Self {
        Self {
            status: TaskStatus::Pending,
            inputs: None,
            outputs: None,
            subworkflow: None,
            subworkflow_output: None,
            error: None,
            is_downstream_of_pause: false,
            updated_at,
        }
    }

    /// Apply a `TaskUpdate` on top of the previous record, keeping whatever
    /// fields the update left unset (mirrors the task recorder's "recognized
    /// fields" update semantics from the interface spec — a caller only
    /// passes the fields it actually has new data for).
    fn merge(mut self, update: TaskUpdate) -> Self {
        if let Some(status) = update.status {
            self.status = status;
        }
        if update.inputs.is_some() {
            self.inputs = update.inputs;
        }
        if update.outputs.is_some() {
            self.outputs = update.outputs;
        }
        if update.subworkflow.is_some() {
            self.subworkflow = update.subworkflow;
        }
        if update.subworkflow_output.is_some() {
            self.subworkflow_output = update.subworkflow_output;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        self.is_downstream_of_pause = update.is_downstream_of_pause;
        self.updated_at = update.timestamp;
        self
    }
}

/// In-memory task recorder, queryable by run id + node id. Good enough for
/// a single-process deployment and for tests; a durable deployment swaps
/// this for a database-backed implementation without touching the
/// scheduler.
#[derive(Default)]
pub struct InMemoryTaskRecorder {
    tasks: RwLock<HashMap<(RunId, String), TaskRecord>>,
}

impl InMemoryTaskRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, run_id: RunId, node_id: &str) -> Option<TaskRecord> {
        self.tasks
            .read()
            .await
            .get(&(run_id, node_id.to_string()))
            .cloned()
    }

    pub async fn tasks_for_run(&self, run_id: RunId) -> HashMap<String, TaskRecord> {
        self.tasks
            .read()
            .await
            .iter()
            .filter(|((rid, _), _)| *rid == run_id)
            .map(|((_, node_id), record)| (node_id.clone(), record.clone()))
            .collect()
    }

    /// Every record for a given node id, across every run this recorder has
    /// seen. Useful for tests and single-run callers that don't track
    /// `run_id` themselves; a multi-run deployment should prefer
    /// `tasks_for_run`.
    pub async fn records_for_node(&self, node_id: &str) -> Vec<TaskRecord> {
        self.tasks
            .read()
            .await
            .iter()
            .filter(|((_, id), _)| id == node_id)
            .map(|(_, record)| record.clone())
            .collect()
    }
}

#[async_trait]
impl TaskRecorder for InMemoryTaskRecorder {
    async fn create_task(&self, run_id: RunId, node_id: &str) {
        self.tasks
            .write()
            .await
            .insert((run_id, node_id.to_string()), TaskRecord::pending(Utc::now()));
    }

    async fn update_task(&self, update: TaskUpdate) {
        let key = (update.run_id, update.node_id.clone());
        let mut tasks = self.tasks.write().await;
        let previous = tasks.remove(&key).unwrap_or_else(|| TaskRecord::pending(update.timestamp));
        tasks.insert(key, previous.merge(update));
    }
}

/// Task recorder that only logs via `tracing`, forwarding every update onto
/// the shared event bus as a `NodeStarted`/`NodeCompleted`/`NodeFailed`
/// event. Used where task history doesn't need to be queried back, only
/// observed live (e.g. the CLI's `Run` subcommand).
pub struct TracingTaskRecorder {
    events: Arc<EventBus>,
    execution_id: ExecutionId,
}

impl TracingTaskRecorder {
    pub fn new(events: Arc<EventBus>, execution_id: ExecutionId) -> Self {
        Self { events, execution_id }
    }
}

#[async_trait]
impl TaskRecorder for TracingTaskRecorder {
    async fn create_task(&self, run_id: RunId, node_id: &str) {
        tracing::debug!(%run_id, node_id, "task created");
    }

    async fn update_task(&self, update: TaskUpdate) {
        let Some(status) = update.status else {
            tracing::debug!(run_id = %update.run_id, node_id = %update.node_id, "task fields updated");
            return;
        };
        match status {
            TaskStatus::Running => {
                tracing::info!(run_id = %update.run_id, node_id = %update.node_id, "node started");
                self.events.emit(ExecutionEvent::NodeStarted {
                    execution_id: self.execution_id,
                    node_id: update.node_id,
                    node_type: String::new(),
                    timestamp: update.timestamp,
                });
            }
            TaskStatus::Completed => {
                tracing::info!(run_id = %update.run_id, node_id = %update.node_id, "node completed");
                self.events.emit(ExecutionEvent::NodeCompleted {
                    execution_id: self.execution_id,
                    node_id: update.node_id,
                    outputs: Default::default(),
                    duration_ms: 0,
                    timestamp: update.timestamp,
                });
            }
            TaskStatus::Failed => {
                tracing::error!(
                    run_id = %update.run_id,
                    node_id = %update.node_id,
                    error = update.error.as_deref().unwrap_or(""),
                    "node failed"
                );
                self.events.emit(ExecutionEvent::NodeFailed {
                    execution_id: self.execution_id,
                    node_id: update.node_id,
                    error: update.error.unwrap_or_default(),
                    timestamp: update.timestamp,
                });
            }
            TaskStatus::Paused => {
                tracing::info!(run_id = %update.run_id, node_id = %update.node_id, "node paused");
            }
            TaskStatus::Pending => {
                tracing::debug!(
                    run_id = %update.run_id,
                    node_id = %update.node_id,
                    is_downstream_of_pause = update.is_downstream_of_pause,
                    "task pending"
                );
            }
            TaskStatus::Canceled => {
                tracing::debug!(run_id = %update.run_id, node_id = %update.node_id, status = ?status, "task status changed");
            }
        }
    }
}
