use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowcore::{RunId, RunRecord, RunStatus, RunStore};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory `RunStore`. Production deployments back this with whatever
/// `DATABASE_URL` points at; this implementation is what the binaries use
/// when none is configured, and what the test suite uses throughout.
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<RunId, RunRecord>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create_run(&self, record: RunRecord) -> flowcore::Result<()> {
        self.runs.write().await.insert(record.run_id, record);
        Ok(())
    }

    async fn set_status(
        &self,
        run_id: RunId,
        status: RunStatus,
        updated_at: DateTime<Utc>,
    ) -> flowcore::Result<()> {
        if let Some(record) = self.runs.write().await.get_mut(&run_id) {
            record.status = status;
            record.updated_at = updated_at;
        }
        Ok(())
    }

    async fn get_run(&self, run_id: RunId) -> flowcore::Result<Option<RunRecord>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }
}
