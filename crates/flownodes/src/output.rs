use async_trait::async_trait;
use flowcore::{ExecutionContext, Node, NodeError, NodeOutcome, NodeOutput, StandardOutput, Value};
use flowruntime::{NodeFactory, NodeMetadata};
use std::collections::HashMap;

/// Terminal node that forwards whatever reached it. An optional
/// `output_map` config remaps dotted `"node_id.port"` paths onto new output
/// keys (mirroring the upstream system's `OutputNode`, which lets a
/// workflow author rename e.g. `"bon_node.response"` to `"answer"`);
/// without one, every predecessor's ports are merged as-is.
pub struct OutputNode {
    output_map: HashMap<String, String>,
}

impl OutputNode {
    pub fn new(config: &HashMap<String, Value>) -> Self {
        let output_map = match config.get("output_map") {
            Some(Value::Object(map)) => map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect(),
            _ => HashMap::new(),
        };
        Self { output_map }
    }
}

#[async_trait]
impl Node for OutputNode {
    fn node_type(&self) -> &str {
        "OutputNode"
    }

    async fn call(
        &self,
        input: HashMap<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutput, NodeOutcome> {
        let values = if self.output_map.is_empty() {
            let mut merged = HashMap::new();
            for value in input.into_values() {
                match value {
                    Value::Object(ports) => merged.extend(ports),
                    other => {
                        merged.insert("value".to_string(), other);
                    }
                }
            }
            merged
        } else {
            let mut values = HashMap::new();
            for (out_key, path) in &self.output_map {
                let Some((node_id, port)) = path.split_once('.') else {
                    return Err(NodeOutcome::Failure(NodeError::Configuration(format!(
                        "output_map entry '{out_key}' -> '{path}' is not of the form 'node_id.port'"
                    ))));
                };
                if let Some(Value::Object(ports)) = input.get(node_id) {
                    if let Some(v) = ports.get(port) {
                        values.insert(out_key.clone(), v.clone());
                    }
                }
            }
            values
        };

        Ok(NodeOutput::Standard(StandardOutput {
            values,
            ..Default::default()
        }))
    }
}

pub struct OutputNodeFactory;

impl NodeFactory for OutputNodeFactory {
    fn create(
        &self,
        _title: &str,
        _node_type: &flowcore::NodeType,
        config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, flowcore::NodeError> {
        Ok(Box::new(OutputNode::new(config)))
    }

    fn node_type(&self) -> &str {
        "OutputNode"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Terminal node collecting a run's result".to_string(),
            category: "control".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
