//! Core abstractions for the flow engine
//! 
//! This crate provides the fundamental types and traits that all other
//! components depend on. It has no runtime dependencies.

mod error;
mod events;
mod node;
mod run_store;
mod serialize;
mod value;
mod workflow;

pub use error::{FlowError, NodeError, WorkflowError};
pub use events::{EventBus, EventEmitter, ExecutionEvent, ExecutionId, NodeEvent, NodeId};
pub use node::{
    ExecutionContext, HumanInterventionOutput, Node, NodeMetadata, NodeOutcome, NodeOutput,
    OutputSchema, PauseSignal, RouterOutput, RunId, RunType, StandardOutput, SubworkflowRunner,
};
pub use run_store::{RunRecord, RunStatus, RunStore};
pub use serialize::{serialize_node_output, serialize_value, serialize_value_map};
pub use value::Value;
pub use workflow::{Link, NodeType, WorkflowDefinition, WorkflowNode};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
