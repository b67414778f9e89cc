use async_trait::async_trait;
use flowcore::{ExecutionContext, Node, NodeOutcome, NodeOutput, StandardOutput, Value};
use flowruntime::{NodeFactory, NodeMetadata};
use std::collections::HashMap;

/// Fan-in join tolerant of missing inputs: the scheduler is the only node
/// type allowed to run when some predecessors produced `null` (the routing
/// branches that weren't taken), so by the time `call` is invoked the
/// scheduler has already dropped those entries — this merges whatever
/// non-null predecessor outputs remain.
pub struct CoalesceNode;

#[async_trait]
impl Node for CoalesceNode {
    fn node_type(&self) -> &str {
        "CoalesceNode"
    }

    async fn call(
        &self,
        input: HashMap<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutput, NodeOutcome> {
        let mut values = HashMap::new();
        for value in input.into_values() {
            match value {
                Value::Object(ports) => values.extend(ports),
                other => {
                    values.insert("value".to_string(), other);
                }
            }
        }
        Ok(NodeOutput::Standard(StandardOutput {
            values,
            ..Default::default()
        }))
    }
}

pub struct CoalesceNodeFactory;

impl NodeFactory for CoalesceNodeFactory {
    fn create(
        &self,
        _title: &str,
        _node_type: &flowcore::NodeType,
        _config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, flowcore::NodeError> {
        Ok(Box::new(CoalesceNode))
    }

    fn node_type(&self) -> &str {
        "CoalesceNode"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Fan-in join that tolerates missing (routed-away) inputs".to_string(),
            category: "control".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
