use crate::events::EventEmitter;
use crate::{NodeError, Value, WorkflowDefinition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

pub type RunId = Uuid;

/// What kind of run an execution belongs to. A subworkflow run carries its
/// parent's run id so recorder entries and events can be correlated back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunType {
    Interactive,
    Batch,
    Subworkflow,
}

impl Default for RunType {
    fn default() -> Self {
        RunType::Interactive
    }
}

/// Capability injected into every `ExecutionContext` so a node that wraps a
/// hoisted subworkflow (see `Node::subworkflow`) can run it without flowcore
/// depending on the scheduler that knows how. Implemented by
/// `flowruntime::Scheduler`.
#[async_trait]
pub trait SubworkflowRunner: Send + Sync {
    async fn run_subworkflow(
        &self,
        workflow: Arc<WorkflowDefinition>,
        inputs: HashMap<String, Value>,
        parent_run_id: RunId,
    ) -> Result<HashMap<String, Value>, NodeError>;
}

/// Per-run identity and shared handles, threaded into every node invocation.
///
/// Lives for exactly one run; cheap to clone (every field is an `Arc` or a
/// small copy type).
#[derive(Clone)]
pub struct ExecutionContext {
    pub run_id: RunId,
    pub parent_run_id: Option<RunId>,
    pub run_type: RunType,
    pub workflow: Arc<WorkflowDefinition>,
    pub persistence: Arc<dyn crate::RunStore>,
    pub events: EventEmitter,
    pub subworkflows: Arc<dyn SubworkflowRunner>,
}

impl ExecutionContext {
    pub fn new(
        run_id: RunId,
        workflow: Arc<WorkflowDefinition>,
        persistence: Arc<dyn crate::RunStore>,
        events: EventEmitter,
        subworkflows: Arc<dyn SubworkflowRunner>,
    ) -> Self {
        Self {
            run_id,
            parent_run_id: None,
            run_type: RunType::Interactive,
            workflow,
            persistence,
            events,
            subworkflows,
        }
    }

    pub fn with_parent(mut self, parent_run_id: RunId, run_type: RunType) -> Self {
        self.parent_run_id = Some(parent_run_id);
        self.run_type = run_type;
        self
    }
}

/// Standard (non-router, non-human-intervention) node output: a bag of named
/// port values plus execution metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardOutput {
    pub values: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: NodeMetadata,
}

impl StandardOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(port.into(), value.into());
        self
    }

    pub fn get(&self, port: &str) -> Option<&Value> {
        self.values.get(port)
    }
}

/// A router's output: exactly one declared handle should carry `Some`, the
/// rest are `None` ("this route was not taken").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterOutput {
    pub routes: HashMap<String, Option<Value>>,
}

impl RouterOutput {
    pub fn new(handles: impl IntoIterator<Item = String>) -> Self {
        Self {
            routes: handles.into_iter().map(|h| (h, None)).collect(),
        }
    }

    pub fn select(mut self, handle: &str, value: impl Into<Value>) -> Self {
        self.routes.insert(handle.to_string(), Some(value.into()));
        self
    }

    pub fn route(&self, handle: &str) -> Option<&Value> {
        self.routes.get(handle).and_then(|v| v.as_ref())
    }
}

/// A human-intervention node's output: which downstream nodes are blocked,
/// and whether (and when) the pause has been resumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanInterventionOutput {
    pub blocked_nodes: HashSet<String>,
    pub resume_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub values: HashMap<String, Value>,
}

impl HumanInterventionOutput {
    pub fn paused(blocked_nodes: impl IntoIterator<Item = String>) -> Self {
        Self {
            blocked_nodes: blocked_nodes.into_iter().collect(),
            resume_time: None,
            values: HashMap::new(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.resume_time.is_none()
    }
}

/// Polymorphic node output. The scheduler treats this as opaque except for
/// two capability checks: "is this a router output" and "is this a
/// human-intervention output".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NodeOutput {
    Standard(StandardOutput),
    Router(RouterOutput),
    HumanIntervention(HumanInterventionOutput),
}

impl NodeOutput {
    pub fn standard() -> Self {
        NodeOutput::Standard(StandardOutput::new())
    }

    pub fn as_router(&self) -> Option<&RouterOutput> {
        match self {
            NodeOutput::Router(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_human_intervention(&self) -> Option<&HumanInterventionOutput> {
        match self {
            NodeOutput::HumanIntervention(h) => Some(h),
            _ => None,
        }
    }

    /// Flatten this output into a plain value map: a `StandardOutput`'s
    /// ports as-is, a `RouterOutput`'s non-null routes, a
    /// `HumanInterventionOutput`'s captured values.
    pub fn values(&self) -> HashMap<String, Value> {
        match self {
            NodeOutput::Standard(s) => s.values.clone(),
            NodeOutput::Router(r) => r
                .routes
                .iter()
                .filter_map(|(k, v)| v.clone().map(|v| (k.clone(), v)))
                .collect(),
            NodeOutput::HumanIntervention(h) => h.values.clone(),
        }
    }

    /// JSON-safe serialization for the task recorder; delegates to the
    /// output serializer's value-normalization rules.
    pub fn serialize(&self) -> serde_json::Value {
        crate::serialize_node_output(self)
    }
}

/// Execution metadata attached to a standard output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub execution_time_ms: u64,
    pub memory_used_bytes: Option<u64>,
    pub custom: HashMap<String, Value>,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            execution_time_ms: 0,
            memory_used_bytes: None,
            custom: HashMap::new(),
        }
    }
}

/// Carried by the `Pause` control-flow signal: which node paused, and the
/// partial output it wants recorded while it waits.
#[derive(Debug, Clone)]
pub struct PauseSignal {
    pub node_id: String,
    pub output: NodeOutput,
}

/// A node's `call` either succeeds, asks to pause (cooperative, not an
/// error), or fails outright. Modeling pause as a distinct branch of the
/// error channel (rather than an ordinary error) keeps `?`-based error
/// handling from accidentally swallowing it.
#[derive(Debug)]
pub enum NodeOutcome {
    Pause(PauseSignal),
    Failure(NodeError),
}

impl From<NodeError> for NodeOutcome {
    fn from(e: NodeError) -> Self {
        NodeOutcome::Failure(e)
    }
}

impl std::fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeOutcome::Pause(sig) => write!(f, "node {} paused", sig.node_id),
            NodeOutcome::Failure(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for NodeOutcome {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NodeOutcome::Failure(e) => Some(e),
            NodeOutcome::Pause(_) => None,
        }
    }
}

/// A node's declared output shape, used to validate precomputed outputs
/// supplied to a run without actually invoking the node.
#[derive(Debug, Clone, Default)]
pub struct OutputSchema {
    pub is_router: bool,
    pub router_handles: Vec<String>,
    pub is_human_intervention: bool,
}

/// Core trait every executable node implements.
#[async_trait]
pub trait Node: Send + Sync {
    /// Registry-facing type identifier (e.g. "http.request", "debug.log").
    fn node_type(&self) -> &str;

    /// Execute the node against its assembled input map.
    async fn call(
        &self,
        input: HashMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutput, NodeOutcome>;

    /// The node's declared output shape, for precomputed-output validation.
    fn output_schema(&self) -> OutputSchema {
        OutputSchema::default()
    }

    /// Validate a raw (already-serialized) output against this node's
    /// schema, used only for precomputed-output validation — the node
    /// itself is not invoked. The default assumes the node produces a
    /// `Standard` output (true of most node types); `RouterNode` and
    /// `HumanInterventionNode` override this to parse their own shapes.
    fn validate_output(&self, raw: &serde_json::Value) -> Result<NodeOutput, NodeError> {
        let values = crate::Value::map_from_json_object(raw)
            .map_err(|e| NodeError::Configuration(format!("invalid precomputed output: {}", e)))?;
        Ok(NodeOutput::Standard(StandardOutput {
            values,
            metadata: NodeMetadata::default(),
        }))
    }

    /// Present only on nodes that materialize a subworkflow (loader-hoisted
    /// parent nodes); used by the task recorder.
    fn subworkflow(&self) -> Option<&WorkflowDefinition> {
        None
    }

    fn subworkflow_output(&self) -> Option<&serde_json::Value> {
        None
    }
}
