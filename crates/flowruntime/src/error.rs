use flowcore::NodeError;
use thiserror::Error;

/// Errors raised while turning a raw workflow definition into something the
/// scheduler can run: hoisting subworkflows, checking for cycles, and
/// validating links and router handles.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("link references unknown node: {0}")]
    DanglingLink(String),

    #[error("workflow must have exactly one top-level input node, found {0}")]
    InputNodeCount(usize),

    #[error("cyclic dependency detected among nodes: {0:?}")]
    CyclicDependency(Vec<String>),

    #[error("link from '{source_id}' names handle '{handle}', which {source_type} does not declare")]
    UnknownRouterHandle {
        source_id: String,
        source_type: String,
        handle: String,
    },

    #[error("link from router node '{source_id}' to '{target_id}' is missing a non-empty source_handle")]
    MissingRouterHandle { source_id: String, target_id: String },

    #[error("node '{0}' is not reachable from the input node for this run")]
    UnreachableNode(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors raised while resolving a `(node_type, config)` pair through the
/// node registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("failed to construct node '{node_id}' ({node_type}): {source}")]
    Construction {
        node_id: String,
        node_type: String,
        #[source]
        source: NodeError,
    },
}

/// Errors raised by the scheduler while driving a single node's execution.
/// These are internal to `run`/`run_batch`; callers see `RunError`. Pause is
/// deliberately absent here — per the pause protocol, a node that pauses
/// returns its output normally, it never raises.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("node '{0}' has no connected inputs and is not the run's input node")]
    UnconnectedNode(String),

    #[error("upstream failure: node '{failed_node}' failed, which '{node_id}' depends on")]
    UpstreamFailure { node_id: String, failed_node: String },

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Top-level error/result surface for a run, returned by `Scheduler::run`
/// and `Scheduler::run_batch`. A paused run is not a failure: its partial
/// outputs are still returned to the caller so a resume can proceed from
/// exactly where execution left off.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("run paused at node '{node_id}'")]
    Paused {
        node_id: String,
        outputs: std::collections::HashMap<String, serde_json::Value>,
    },

    #[error("run failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Loader(#[from] LoaderError),
}
