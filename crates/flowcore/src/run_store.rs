use crate::node::RunId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a run, as tracked by a `RunStore`.
///
/// `Paused` is distinct from `Failed` — it means a human-intervention node
/// is waiting on resume, not that anything went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub parent_run_id: Option<RunId>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(run_id: RunId, parent_run_id: Option<RunId>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            parent_run_id,
            status: RunStatus::Running,
            started_at,
            updated_at: started_at,
        }
    }
}

/// Durable home for run status, analogous to the `DATABASE_URL`-backed run
/// table the engine this crate descends from keeps alongside its task
/// records. The scheduler only needs to create a run and flip its status;
/// everything else (task-level detail) lives in the task recorder.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_run(&self, record: RunRecord) -> crate::Result<()>;
    async fn set_status(
        &self,
        run_id: RunId,
        status: RunStatus,
        updated_at: DateTime<Utc>,
    ) -> crate::Result<()>;
    async fn get_run(&self, run_id: RunId) -> crate::Result<Option<RunRecord>>;
}
