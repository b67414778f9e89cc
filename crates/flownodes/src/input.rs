use async_trait::async_trait;
use flowcore::{ExecutionContext, Node, NodeOutcome, NodeOutput, StandardOutput, Value};
use flowruntime::{NodeFactory, NodeMetadata};
use std::collections::HashMap;

/// The unique top-level node a run's `initial_input` feeds. The scheduler
/// substitutes `initial_inputs` for whatever this node's (empty) predecessor
/// set would otherwise assemble, so `call` just wraps whatever it's handed.
pub struct InputNode;

#[async_trait]
impl Node for InputNode {
    fn node_type(&self) -> &str {
        "InputNode"
    }

    async fn call(
        &self,
        input: HashMap<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutput, NodeOutcome> {
        Ok(NodeOutput::Standard(StandardOutput {
            values: input,
            ..Default::default()
        }))
    }
}

pub struct InputNodeFactory;

impl NodeFactory for InputNodeFactory {
    fn create(
        &self,
        _title: &str,
        _node_type: &flowcore::NodeType,
        _config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, flowcore::NodeError> {
        Ok(Box::new(InputNode))
    }

    fn node_type(&self) -> &str {
        "InputNode"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Seeds a run with its initial input".to_string(),
            category: "control".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
