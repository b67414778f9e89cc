use async_trait::async_trait;
use flowcore::{
    ExecutionContext, Node, NodeError, NodeOutcome, NodeOutput, OutputSchema, RouterOutput, Value,
};
use flowruntime::{NodeFactory, NodeMetadata};
use std::collections::HashMap;

/// Conditional branch: declares a fixed set of handles, selects exactly one
/// per invocation, and produces a `RouterOutput` naming it. Selection is
/// expression-free by design (node semantics beyond this are a Non-goal):
/// a `selector` config field names a key to look up among the assembled
/// input; its string value, if it matches a declared handle, wins.
/// Without a match, the first handle whose corresponding boolean-valued
/// input field is `true` is selected; failing that, the first declared
/// handle is used so a router never produces an entirely empty output.
pub struct RouterNode {
    handles: Vec<String>,
    selector: Option<String>,
}

impl RouterNode {
    pub fn new(config: &HashMap<String, Value>) -> Result<Self, NodeError> {
        let handles = match config.get("handles") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect::<Vec<_>>(),
            _ => {
                return Err(NodeError::Configuration(
                    "RouterNode requires a non-empty 'handles' array in config".to_string(),
                ))
            }
        };
        if handles.is_empty() {
            return Err(NodeError::Configuration(
                "RouterNode requires at least one declared handle".to_string(),
            ));
        }
        let selector = config.get("selector").and_then(|v| v.as_str()).map(str::to_string);
        Ok(Self { handles, selector })
    }

    fn find_field<'a>(input: &'a HashMap<String, Value>, field: &str) -> Option<&'a Value> {
        for value in input.values() {
            if let Value::Object(ports) = value {
                if let Some(v) = ports.get(field) {
                    return Some(v);
                }
            }
        }
        None
    }

    fn select(&self, input: &HashMap<String, Value>) -> String {
        if let Some(selector) = &self.selector {
            if let Some(v) = Self::find_field(input, selector).and_then(Value::as_str) {
                if self.handles.iter().any(|h| h == v) {
                    return v.to_string();
                }
            }
        }
        for handle in &self.handles {
            if Self::find_field(input, handle)
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                return handle.clone();
            }
        }
        self.handles[0].clone()
    }
}

#[async_trait]
impl Node for RouterNode {
    fn node_type(&self) -> &str {
        "RouterNode"
    }

    async fn call(
        &self,
        input: HashMap<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutput, NodeOutcome> {
        let selected = self.select(&input);
        let merged = Value::Object(input);

        let mut output = RouterOutput::new(self.handles.iter().cloned());
        output = output.select(&selected, merged);
        Ok(NodeOutput::Router(output))
    }

    fn output_schema(&self) -> OutputSchema {
        OutputSchema {
            is_router: true,
            router_handles: self.handles.clone(),
            is_human_intervention: false,
        }
    }

    fn validate_output(&self, raw: &serde_json::Value) -> Result<NodeOutput, NodeError> {
        let serde_json::Value::Object(map) = raw else {
            return Err(NodeError::Configuration(
                "router precomputed output must be a JSON object keyed by handle".to_string(),
            ));
        };
        let mut routes = HashMap::new();
        for handle in &self.handles {
            let value = match map.get(handle) {
                Some(serde_json::Value::Null) | None => None,
                Some(v) => Some(Value::from_json(v.clone())),
            };
            routes.insert(handle.clone(), value);
        }
        Ok(NodeOutput::Router(RouterOutput { routes }))
    }
}

pub struct RouterNodeFactory;

impl NodeFactory for RouterNodeFactory {
    fn create(
        &self,
        _title: &str,
        _node_type: &flowcore::NodeType,
        config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(RouterNode::new(config)?))
    }

    fn node_type(&self) -> &str {
        "RouterNode"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Selects exactly one declared handle to branch execution".to_string(),
            category: "control".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
