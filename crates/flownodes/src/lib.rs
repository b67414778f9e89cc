//! Standard node library
//!
//! Built-in nodes: the closed set the engine itself relies on for control
//! flow (`InputNode`, `OutputNode`, `RouterNode`, `CoalesceNode`,
//! `HumanInterventionNode`) plus a handful of generic-purpose nodes
//! (`debug.log`, `http.request`, `transform.json_parse`,
//! `transform.json_stringify`, `time.delay`, `docker.run`) showing how a
//! workflow author adds their own.

mod coalesce;
mod debug;
mod docker;
mod http;
mod human_intervention;
mod input;
mod output;
mod router;
mod time;
mod transform;

pub use coalesce::{CoalesceNode, CoalesceNodeFactory};
pub use debug::{DebugNode, DebugNodeFactory};
pub use docker::{DockerNode, DockerNodeFactory};
pub use http::{HttpRequestNode, HttpRequestNodeFactory};
pub use human_intervention::{HumanInterventionNode, HumanInterventionNodeFactory, ResumeRegistry};
pub use input::{InputNode, InputNodeFactory};
pub use output::{OutputNode, OutputNodeFactory};
pub use router::{RouterNode, RouterNodeFactory};
pub use time::{DelayNode, DelayNodeFactory};
pub use transform::{JsonParseNode, JsonParseNodeFactory, JsonStringifyNode, JsonStringifyNodeFactory};

use flowruntime::NodeRegistry;
use std::sync::Arc;

/// Registers every node in this crate with `registry`, returning the
/// `ResumeRegistry` a caller needs to resume any `HumanInterventionNode`
/// parked in a loaded workflow.
pub fn register_all(registry: &mut NodeRegistry) -> Arc<ResumeRegistry> {
    registry.register(Arc::new(input::InputNodeFactory));
    registry.register(Arc::new(output::OutputNodeFactory));
    registry.register(Arc::new(router::RouterNodeFactory));
    registry.register(Arc::new(coalesce::CoalesceNodeFactory));

    let resume_registry = Arc::new(ResumeRegistry::new());
    registry.register(Arc::new(human_intervention::HumanInterventionNodeFactory::new(
        resume_registry.clone(),
    )));

    registry.register(Arc::new(debug::DebugNodeFactory));
    registry.register(Arc::new(docker::DockerNodeFactory));
    registry.register(Arc::new(http::HttpRequestNodeFactory));
    registry.register(Arc::new(transform::JsonParseNodeFactory));
    registry.register(Arc::new(transform::JsonStringifyNodeFactory));
    registry.register(Arc::new(time::DelayNodeFactory));

    resume_registry
}
