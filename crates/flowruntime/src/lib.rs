//! Workflow execution runtime
//!
//! This crate owns the scheduler: loading a raw workflow definition into its
//! hoisted, validated form, driving concurrent per-node execution, recording
//! task lifecycle, and tracking run status. Node semantics themselves are
//! external (see `flownodes` for an example library).

mod error;
mod loader;
mod recorder;
mod registry;
mod run_store;
mod runtime;
mod scheduler;

pub use error::{LoaderError, RegistryError, RunError, SchedulerError};
pub use loader::{check_reachable_from_input, load};
pub use recorder::{InMemoryTaskRecorder, TaskRecord, TaskRecorder, TaskStatus, TaskUpdate, TracingTaskRecorder};
pub use registry::{NodeFactory, NodeMetadata, NodeRegistry, PortDefinition};
pub use run_store::InMemoryRunStore;
pub use runtime::{FlowRuntime, RuntimeConfig};
pub use scheduler::{RunOptions, Scheduler};
