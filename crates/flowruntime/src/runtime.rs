use crate::recorder::TaskRecorder;
use crate::registry::NodeRegistry;
use crate::run_store::InMemoryRunStore;
use crate::scheduler::{RunOptions, Scheduler};
use crate::InMemoryTaskRecorder;
use flowcore::{EventBus, RunStore, Value, WorkflowDefinition};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Tunables for how a `FlowRuntime` drives its scheduler: bounded
/// concurrency for `run_batch`, and the event bus's broadcast buffer size.
/// The scheduler itself stays configuration-free per spec; this only
/// governs the ambient bootstrap around it.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub max_parallel_runs: usize,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_runs: 10,
            event_buffer_size: 1000,
        }
    }
}

/// Front door most callers (the CLI, the HTTP server) use instead of
/// constructing a `Scheduler` directly: bundles a node registry, an event
/// bus, a task recorder, and a run store, plus an in-memory registry of
/// workflow definitions keyed by id so a caller can register once and
/// execute by id repeatedly.
pub struct FlowRuntime {
    scheduler: Arc<Scheduler>,
    registry: Arc<NodeRegistry>,
    recorder: Arc<dyn TaskRecorder>,
    run_store: Arc<dyn RunStore>,
    events: Arc<EventBus>,
    config: RuntimeConfig,
    workflows: RwLock<HashMap<Uuid, WorkflowDefinition>>,
}

impl FlowRuntime {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(NodeRegistry::new()), RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(NodeRegistry::new()), config)
    }

    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        let events = Arc::new(EventBus::new(config.event_buffer_size));
        let recorder: Arc<dyn TaskRecorder> = Arc::new(InMemoryTaskRecorder::new());
        let run_store: Arc<dyn RunStore> = Arc::new(InMemoryRunStore::new());
        let scheduler = Arc::new(Scheduler::new(
            registry.clone(),
            recorder.clone(),
            run_store.clone(),
            events.clone(),
        ));
        Self {
            scheduler,
            registry,
            recorder,
            run_store,
            events,
            config,
            workflows: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn recorder(&self) -> &Arc<dyn TaskRecorder> {
        &self.recorder
    }

    pub fn run_store(&self) -> &Arc<dyn RunStore> {
        &self.run_store
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Register a workflow definition under a fresh id, for callers (the
    /// HTTP server) that address workflows by id rather than holding the
    /// definition themselves.
    pub async fn register_workflow(&self, id: Uuid, workflow: WorkflowDefinition) {
        self.workflows.write().await.insert(id, workflow);
    }

    pub async fn get_workflow(&self, id: Uuid) -> Option<WorkflowDefinition> {
        self.workflows.read().await.get(&id).cloned()
    }

    pub async fn list_workflows(&self) -> Vec<(Uuid, WorkflowDefinition)> {
        self.workflows
            .read()
            .await
            .iter()
            .map(|(id, def)| (*id, def.clone()))
            .collect()
    }

    pub async fn remove_workflow(&self, id: Uuid) -> Option<WorkflowDefinition> {
        self.workflows.write().await.remove(&id)
    }

    /// Run a workflow definition once to completion, to a pause, or to
    /// failure. Thin pass-through to `Scheduler::run` with default options.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        inputs: HashMap<String, Value>,
    ) -> Result<HashMap<String, serde_json::Value>, crate::RunError> {
        self.scheduler
            .run(workflow.clone(), inputs, RunOptions::default())
            .await
    }

    /// Look up a registered workflow by id and run it.
    pub async fn execute_workflow(
        &self,
        id: Uuid,
        inputs: HashMap<String, Value>,
    ) -> Result<HashMap<String, serde_json::Value>, crate::RunError> {
        let workflow = self
            .get_workflow(id)
            .await
            .ok_or_else(|| crate::RunError::Failed(format!("workflow {id} not registered")))?;
        self.execute(&workflow, inputs).await
    }

    /// Re-enter `run` for a workflow that previously paused, supplying the
    /// partial outputs already recorded as precomputed so completed nodes
    /// are not re-executed, and handing `resume_inputs` to whichever node
    /// paused (that node's own implementation decides how to interpret
    /// being invoked again — the resume trigger itself lives outside the
    /// scheduler).
    ///
    /// `paused_outputs` is exactly the map `run` returned alongside
    /// `RunError::Paused`, which includes the paused node's own entry (its
    /// `HumanIntervention` output with `resume_time: null`). That entry is
    /// dropped before seeding `precomputed_outputs`: feeding it back in
    /// would make the scheduler replay the still-paused record instead of
    /// invoking the node again, so the run would pause at the same node
    /// forever no matter how many times the external event fired.
    pub async fn resume(
        &self,
        workflow: &WorkflowDefinition,
        paused_outputs: HashMap<String, serde_json::Value>,
        initial_inputs: HashMap<String, Value>,
        node_ids: Option<std::collections::HashSet<String>>,
    ) -> Result<HashMap<String, serde_json::Value>, crate::RunError> {
        let precomputed_outputs = paused_outputs
            .into_iter()
            .filter(|(_, value)| !is_unresolved_pause(value))
            .collect();
        let options = RunOptions {
            node_ids,
            precomputed_outputs,
            ..RunOptions::default()
        };
        self.scheduler.run(workflow.clone(), initial_inputs, options).await
    }

    /// Run a workflow once per input, bounded by `RuntimeConfig::max_parallel_runs`.
    pub async fn execute_batch(
        &self,
        workflow: &WorkflowDefinition,
        inputs: Vec<HashMap<String, Value>>,
    ) -> Vec<Result<HashMap<String, serde_json::Value>, crate::RunError>> {
        self.scheduler
            .run_batch(workflow.clone(), inputs, self.config.max_parallel_runs)
            .await
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<flowcore::ExecutionEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.events
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// A recorded output looks like an unresolved `HumanInterventionOutput`
/// (`blocked_nodes` + a null `resume_time`) iff it is a JSON object with
/// both keys present and `resume_time` is `null`. Anything else — a
/// completed standard/router output, or a human-intervention output that
/// has since resolved — is a legitimate precomputed value.
fn is_unresolved_pause(value: &serde_json::Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    obj.contains_key("blocked_nodes") && matches!(obj.get("resume_time"), Some(serde_json::Value::Null))
}
