use async_trait::async_trait;
use flowcore::{ExecutionContext, Node, NodeOutcome, NodeOutput, StandardOutput, Value};
use flowruntime::{NodeFactory, NodeMetadata};
use std::collections::HashMap;

/// Logs its inputs and passes them through unchanged. Useful for inspecting
/// intermediate values while authoring a workflow.
pub struct DebugNode;

#[async_trait]
impl Node for DebugNode {
    fn node_type(&self) -> &str {
        "debug.log"
    }

    async fn call(
        &self,
        input: HashMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutput, NodeOutcome> {
        for (key, value) in &input {
            ctx.events.info(format!("{}: {:?}", key, value));
        }
        Ok(NodeOutput::Standard(StandardOutput {
            values: input,
            ..Default::default()
        }))
    }
}

pub struct DebugNodeFactory;

impl NodeFactory for DebugNodeFactory {
    fn create(
        &self,
        _title: &str,
        _node_type: &flowcore::NodeType,
        _config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, flowcore::NodeError> {
        Ok(Box::new(DebugNode))
    }

    fn node_type(&self) -> &str {
        "debug.log"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Logs input values for debugging".to_string(),
            category: "debug".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
