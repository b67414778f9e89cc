use crate::error::{RunError, SchedulerError};
use crate::loader;
use crate::recorder::{TaskRecorder, TaskStatus, TaskUpdate};
use crate::registry::NodeRegistry;
use async_trait::async_trait;
use chrono::Utc;
use flowcore::{
    EventBus, ExecutionContext, ExecutionEvent, Link, Node, NodeError, NodeOutcome, NodeOutput,
    NodeType, RunId, RunRecord, RunStatus, RunStore, RunType, SubworkflowRunner, Value,
    WorkflowDefinition, WorkflowNode,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A node's memoized final value: `Some` is a real output, `None` is "null"
/// in the sense the scheduler uses it — canceled by routing, or pending
/// because it is downstream of an unresolved pause. Both are ordinary
/// successes; only genuine failures travel through the `Err` side.
type NodeResult = Result<Arc<Option<NodeOutput>>, Arc<SchedulerError>>;
type NodeFuture = Shared<BoxFuture<'static, NodeResult>>;

#[derive(Default)]
pub struct RunOptions {
    pub node_ids: Option<HashSet<String>>,
    pub precomputed_outputs: HashMap<String, serde_json::Value>,
    pub parent_run_id: Option<RunId>,
    pub run_type: RunType,
}

struct RunState {
    definition: Arc<WorkflowDefinition>,
    registry: Arc<NodeRegistry>,
    recorder: Arc<dyn TaskRecorder>,
    run_store: Arc<dyn RunStore>,
    events: Arc<EventBus>,
    subworkflows: Arc<dyn SubworkflowRunner>,
    run_id: RunId,
    parent_run_id: Option<RunId>,
    run_type: RunType,
    initial_inputs: HashMap<String, Value>,
    precomputed: HashMap<String, serde_json::Value>,
    tasks: Mutex<HashMap<String, NodeFuture>>,
}

/// Drives concurrent, memoized execution of a workflow: the engine's core.
///
/// Grounded on the recursive, memoized-task execution style of the
/// executor this engine descends from, reimplemented with real `tokio`
/// task parallelism rather than single-threaded cooperative scheduling —
/// every node handle is a `tokio::spawn`ed task, and the lookup-then-insert
/// into the shared task map is guarded by a `tokio::sync::Mutex` so
/// at-most-once execution holds under true parallelism, not just under
/// cooperative non-preemption.
pub struct Scheduler {
    registry: Arc<NodeRegistry>,
    recorder: Arc<dyn TaskRecorder>,
    run_store: Arc<dyn RunStore>,
    events: Arc<EventBus>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<NodeRegistry>,
        recorder: Arc<dyn TaskRecorder>,
        run_store: Arc<dyn RunStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            recorder,
            run_store,
            events,
        }
    }

    /// Run a workflow definition to completion, to a pause, or to failure.
    pub async fn run(
        &self,
        definition: WorkflowDefinition,
        initial_inputs: HashMap<String, Value>,
        options: RunOptions,
    ) -> Result<HashMap<String, serde_json::Value>, RunError> {
        let loaded = loader::load(definition)?;
        if let Some(ids) = &options.node_ids {
            loader::check_reachable_from_input(&loaded, ids)?;
        }
        let definition = Arc::new(loaded);

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let _ = self
            .run_store
            .create_run(RunRecord::new(run_id, options.parent_run_id, started_at))
            .await;
        self.events.emit(ExecutionEvent::WorkflowStarted {
            execution_id: run_id,
            timestamp: started_at,
        });

        let state = Arc::new(RunState {
            definition: definition.clone(),
            registry: self.registry.clone(),
            recorder: self.recorder.clone(),
            run_store: self.run_store.clone(),
            events: self.events.clone(),
            subworkflows: nested_runner(self),
            run_id,
            parent_run_id: options.parent_run_id,
            run_type: options.run_type,
            initial_inputs,
            precomputed: options.precomputed_outputs,
            tasks: Mutex::new(HashMap::new()),
        });

        let target_ids: Vec<String> = match &options.node_ids {
            Some(ids) => ids.iter().cloned().collect(),
            None => definition.nodes.iter().map(|n| n.id.clone()).collect(),
        };

        let mut handles = Vec::with_capacity(target_ids.len());
        for id in &target_ids {
            handles.push(get_or_spawn_task(state.clone(), id.clone()).await);
        }
        let results = futures::future::join_all(handles).await;

        let mut pairs: Vec<(&String, &NodeResult)> = target_ids.iter().zip(results.iter()).collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        let mut outputs = HashMap::new();
        let mut pause_origin: Option<String> = None;

        for (id, result) in pairs.iter().copied() {
            if let Ok(maybe_output) = result {
                if let Some(output) = maybe_output.as_ref() {
                    if pause_origin.is_none() {
                        if let Some(hi) = output.as_human_intervention() {
                            if hi.is_paused() {
                                pause_origin = Some(id.clone());
                            }
                        }
                    }
                    outputs.insert(id.clone(), output.serialize());
                }
            }
        }

        // Second pass over the failures, now that `pause_origin` (if any) is
        // known: a node transitively downstream of the pause is downgraded
        // to `Pending`/`is_downstream_of_pause`, even if it actually ran and
        // failed on its own merits, rather than being left `Failed`. Only a
        // failure that is not downstream of the pause becomes the run's
        // reported failure.
        let mut failure: Option<String> = None;
        for (id, result) in pairs.iter().copied() {
            let Err(e) = result else { continue };
            if let Some(paused) = &pause_origin {
                if is_downstream_of(&state.definition, paused, id) {
                    self.recorder
                        .update_task(TaskUpdate {
                            run_id,
                            node_id: id.clone(),
                            status: Some(TaskStatus::Pending),
                            is_downstream_of_pause: true,
                            timestamp: Utc::now(),
                            ..Default::default()
                        })
                        .await;
                    continue;
                }
            }
            if failure.is_none() {
                failure = Some(e.to_string());
            }
        }

        let finished_at = Utc::now();
        if let Some(node_id) = pause_origin {
            let _ = self
                .run_store
                .set_status(run_id, RunStatus::Paused, finished_at)
                .await;
            self.events.emit(ExecutionEvent::WorkflowCompleted {
                execution_id: run_id,
                success: true,
                duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
                timestamp: finished_at,
            });
            return Err(RunError::Paused { node_id, outputs });
        }

        if let Some(message) = failure {
            let _ = self
                .run_store
                .set_status(run_id, RunStatus::Failed, finished_at)
                .await;
            self.events.emit(ExecutionEvent::WorkflowCompleted {
                execution_id: run_id,
                success: false,
                duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
                timestamp: finished_at,
            });
            return Err(RunError::Failed(message));
        }

        let _ = self
            .run_store
            .set_status(run_id, RunStatus::Completed, finished_at)
            .await;
        self.events.emit(ExecutionEvent::WorkflowCompleted {
            execution_id: run_id,
            success: true,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
            timestamp: finished_at,
        });
        Ok(outputs)
    }

    /// Run the same definition once per input, at most `batch_size` runs
    /// in flight at a time, preserving input order in the result vector.
    /// Runs share no state with each other.
    pub async fn run_batch(
        self: &Arc<Self>,
        definition: WorkflowDefinition,
        inputs: Vec<HashMap<String, Value>>,
        batch_size: usize,
    ) -> Vec<Result<HashMap<String, serde_json::Value>, RunError>> {
        let batch_size = batch_size.max(1);
        let mut results = Vec::with_capacity(inputs.len());

        for chunk in inputs.chunks(batch_size) {
            let mut handles = Vec::with_capacity(chunk.len());
            for input in chunk {
                let scheduler = self.clone();
                let definition = definition.clone();
                let input = input.clone();
                handles.push(tokio::spawn(async move {
                    scheduler.run(definition, input, RunOptions::default()).await
                }));
            }
            for handle in handles {
                results.push(handle.await.unwrap_or_else(|e| {
                    Err(RunError::Failed(format!("batch run task panicked: {e}")))
                }));
            }
        }

        results
    }
}

/// Capability handed to nodes via `ExecutionContext::subworkflows`. Builds
/// a fresh `Scheduler` sharing this run's registry/recorder/run
/// store/events to drive a hoisted child definition as its own run, so a
/// node needn't hold a reference back to the scheduler that invoked it —
/// only the pieces needed to start an equivalent one.
struct NestedRunner {
    registry: Arc<NodeRegistry>,
    recorder: Arc<dyn TaskRecorder>,
    run_store: Arc<dyn RunStore>,
    events: Arc<EventBus>,
}

#[async_trait]
impl SubworkflowRunner for NestedRunner {
    async fn run_subworkflow(
        &self,
        workflow: Arc<WorkflowDefinition>,
        inputs: HashMap<String, Value>,
        parent_run_id: RunId,
    ) -> Result<HashMap<String, Value>, NodeError> {
        let scheduler = Scheduler::new(
            self.registry.clone(),
            self.recorder.clone(),
            self.run_store.clone(),
            self.events.clone(),
        );
        let options = RunOptions {
            parent_run_id: Some(parent_run_id),
            run_type: RunType::Subworkflow,
            ..RunOptions::default()
        };
        match scheduler.run((*workflow).clone(), inputs, options).await {
            Ok(outputs) => Ok(outputs.into_iter().map(|(k, v)| (k, Value::Json(v))).collect()),
            Err(RunError::Paused { .. }) => Err(NodeError::ExecutionFailed(
                "subworkflow paused; nested pause is not supported".to_string(),
            )),
            Err(RunError::Failed(message)) => Err(NodeError::ExecutionFailed(message)),
            Err(RunError::Loader(e)) => Err(NodeError::Configuration(e.to_string())),
        }
    }
}

fn nested_runner(scheduler: &Scheduler) -> Arc<dyn SubworkflowRunner> {
    Arc::new(NestedRunner {
        registry: scheduler.registry.clone(),
        recorder: scheduler.recorder.clone(),
        run_store: scheduler.run_store.clone(),
        events: scheduler.events.clone(),
    })
}

/// Single entry point mapping a node id to its execution handle. The
/// lookup-then-insert happens under one lock acquisition, so two
/// concurrent callers racing to resolve the same id always observe the
/// same spawned task rather than each spawning their own.
async fn get_or_spawn_task(state: Arc<RunState>, node_id: String) -> NodeFuture {
    let mut tasks = state.tasks.lock().await;
    if let Some(existing) = tasks.get(&node_id) {
        return existing.clone();
    }

    let spawn_state = state.clone();
    let spawn_id = node_id.clone();
    let join = tokio::spawn(async move { execute_node(spawn_state, spawn_id).await });

    let fut: BoxFuture<'static, NodeResult> = async move {
        match join.await {
            Ok(result) => result,
            Err(join_err) => Err(Arc::new(SchedulerError::Node(NodeError::ExecutionFailed(
                format!("node task panicked: {join_err}"),
            )))),
        }
    }
    .boxed();

    let shared = fut.shared();
    tasks.insert(node_id, shared.clone());
    shared
}

async fn execute_node(state: Arc<RunState>, node_id: String) -> NodeResult {
    execute_node_inner(&state, &node_id)
        .await
        .map(Arc::new)
        .map_err(Arc::new)
}

fn incoming_links<'a>(definition: &'a WorkflowDefinition, node_id: &str) -> Vec<&'a Link> {
    definition
        .links
        .iter()
        .filter(|l| l.target_id == node_id)
        .collect()
}

/// Full ancestor walk: is `ancestor_id` reachable by following predecessor
/// links backward from `node_id`? Used to decide whether a node that failed
/// during the same sweep as a pause is genuinely downstream of that pause,
/// rather than following a single arbitrary predecessor chain (which could
/// miss an ancestor reachable only through a different branch).
fn is_downstream_of(definition: &WorkflowDefinition, ancestor_id: &str, node_id: &str) -> bool {
    if ancestor_id == node_id {
        return false;
    }
    let mut backward: HashMap<&str, Vec<&str>> = HashMap::new();
    for link in &definition.links {
        backward
            .entry(link.target_id.as_str())
            .or_default()
            .push(link.source_id.as_str());
    }
    let mut visited = HashSet::new();
    let mut stack = vec![node_id];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        if id == ancestor_id {
            return true;
        }
        if let Some(preds) = backward.get(id) {
            stack.extend(preds.iter().copied());
        }
    }
    false
}

async fn execute_node_inner(
    state: &Arc<RunState>,
    node_id: &str,
) -> Result<Option<NodeOutput>, SchedulerError> {
    let node = state
        .definition
        .find_node(node_id)
        .expect("target node ids are drawn from the loaded definition");

    if let Some(raw) = state.precomputed.get(node_id) {
        if let Some(output) = try_validate_precomputed(state, node, raw).await {
            record_completed(state, node_id, &output, None, None).await;
            return Ok(Some(output));
        }
    }

    let dep_links = incoming_links(&state.definition, node_id);

    let mut handles = Vec::with_capacity(dep_links.len());
    for link in &dep_links {
        handles.push(get_or_spawn_task(state.clone(), link.source_id.clone()).await);
    }
    let dep_results = futures::future::join_all(handles).await;

    for (link, result) in dep_links.iter().zip(dep_results.iter()) {
        if result.is_err() {
            record_status(state, node_id, TaskStatus::Canceled, false, None, Some("Upstream failure")).await;
            return Err(SchedulerError::UpstreamFailure {
                node_id: node_id.to_string(),
                failed_node: link.source_id.clone(),
            });
        }
    }

    for (_link, result) in dep_links.iter().zip(dep_results.iter()) {
        let maybe_output = result.as_ref().expect("errors handled above");
        let Some(output) = maybe_output.as_ref() else {
            continue;
        };
        if let Some(hi) = output.as_human_intervention() {
            if hi.is_paused() && hi.blocked_nodes.contains(node_id) {
                record_status(state, node_id, TaskStatus::Pending, true, None, None).await;
                return Ok(None);
            }
        }
    }

    let mut inputs = HashMap::new();
    let mut any_null = false;
    for (link, result) in dep_links.iter().zip(dep_results.into_iter()) {
        let maybe_output = result.expect("errors handled above");
        let value = match maybe_output.as_ref() {
            None => None,
            Some(output) => match output.as_router() {
                Some(router) => {
                    let handle = link.source_handle.as_deref().unwrap_or_default();
                    router.route(handle).cloned()
                }
                None => Some(Value::Object(output.values())),
            },
        };
        match value {
            Some(v) => {
                inputs.insert(link.source_id.clone(), v);
            }
            None => any_null = true,
        }
    }

    if any_null && node.node_type != NodeType::Coalesce {
        record_status(state, node_id, TaskStatus::Canceled, false, None, None).await;
        return Ok(None);
    }

    if node.node_type == NodeType::Input {
        inputs = state.initial_inputs.clone();
    }

    if inputs.is_empty() {
        record_status(state, node_id, TaskStatus::Failed, false, None, Some("unconnected node")).await;
        return Err(SchedulerError::UnconnectedNode(node_id.to_string()));
    }

    let node_instance = state
        .registry
        .create_node(node)
        .map_err(SchedulerError::from)?;

    state.recorder.create_task(state.run_id, node_id).await;
    let inputs_json = flowcore::serialize_value_map(&inputs);
    record_running(state, node_id, inputs_json).await;

    let ctx = ExecutionContext::new(
        state.run_id,
        state.definition.clone(),
        state.run_store.clone(),
        state.events.create_emitter(state.run_id, node_id.to_string()),
        state.subworkflows.clone(),
    )
    .with_parent(state.parent_run_id.unwrap_or(state.run_id), state.run_type);

    match node_instance.call(inputs, &ctx).await {
        Ok(output) => {
            let subworkflow = node_instance
                .subworkflow()
                .map(|def| serde_json::to_value(def).unwrap_or(serde_json::Value::Null));
            record_completed(state, node_id, &output, subworkflow.as_ref(), node_instance.subworkflow_output())
                .await;
            Ok(Some(output))
        }
        Err(NodeOutcome::Pause(signal)) => {
            record_status(
                state,
                node_id,
                TaskStatus::Paused,
                false,
                Some(signal.output.serialize()),
                None,
            )
            .await;
            let _ = state
                .run_store
                .set_status(state.run_id, RunStatus::Paused, Utc::now())
                .await;
            Ok(Some(signal.output))
        }
        Err(NodeOutcome::Failure(e)) => {
            record_status(state, node_id, TaskStatus::Failed, false, None, Some(&e.to_string())).await;
            Err(SchedulerError::Node(e))
        }
    }
}

async fn try_validate_precomputed(
    state: &Arc<RunState>,
    node: &WorkflowNode,
    raw: &serde_json::Value,
) -> Option<NodeOutput> {
    let instance = match state.registry.create_node(node) {
        Ok(instance) => instance,
        Err(e) => {
            tracing::warn!(node_id = %node.id, error = %e, "precomputed output validation skipped: node could not be instantiated");
            return None;
        }
    };
    match instance.validate_output(raw) {
        Ok(output) => Some(output),
        Err(e) => {
            tracing::warn!(node_id = %node.id, error = %e, "precomputed output failed validation, executing node instead");
            None
        }
    }
}

async fn record_completed(
    state: &Arc<RunState>,
    node_id: &str,
    output: &NodeOutput,
    subworkflow: Option<&serde_json::Value>,
    subworkflow_output: Option<&serde_json::Value>,
) {
    state
        .recorder
        .update_task(TaskUpdate {
            run_id: state.run_id,
            node_id: node_id.to_string(),
            status: Some(TaskStatus::Completed),
            outputs: Some(output.serialize()),
            subworkflow: subworkflow.cloned(),
            subworkflow_output: subworkflow_output.cloned(),
            timestamp: Utc::now(),
            ..Default::default()
        })
        .await;
}

/// Record the node's assembled inputs and flip it to `Running`, just before
/// invocation — the task recorder's `inputs` field per the interface spec.
async fn record_running(state: &Arc<RunState>, node_id: &str, inputs: serde_json::Value) {
    state
        .recorder
        .update_task(TaskUpdate {
            run_id: state.run_id,
            node_id: node_id.to_string(),
            status: Some(TaskStatus::Running),
            inputs: Some(inputs),
            timestamp: Utc::now(),
            ..Default::default()
        })
        .await;
}

async fn record_status(
    state: &Arc<RunState>,
    node_id: &str,
    status: TaskStatus,
    is_downstream_of_pause: bool,
    outputs: Option<serde_json::Value>,
    error: Option<&str>,
) {
    state
        .recorder
        .update_task(TaskUpdate {
            run_id: state.run_id,
            node_id: node_id.to_string(),
            status: Some(status),
            outputs,
            error: error.map(str::to_string),
            is_downstream_of_pause,
            timestamp: Utc::now(),
            ..Default::default()
        })
        .await;
}
