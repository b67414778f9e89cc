use thiserror::Error;

/// Top-level error for anything that can go wrong while building or running
/// a flowcore value outside the scheduler's own control-flow (that lives in
/// `flowruntime::error`).
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors a node's own logic can raise. These propagate through
/// `NodeOutcome::Failure` and are recorded as `TaskStatus::Failed`.
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Node initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Cancelled")]
    Cancelled,
}

/// Errors raised by the node registry while resolving `(node_type, config)`
/// to an instance. Unknown node types must fail loudly, per spec.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Invalid node configuration for {node_id} ({node_type}): {reason}")]
    InvalidConfig {
        node_id: String,
        node_type: String,
        reason: String,
    },
}
