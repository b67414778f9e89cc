use async_trait::async_trait;
use flowcore::{ExecutionContext, Node, NodeError, NodeOutcome, NodeOutput, StandardOutput, Value};
use flowruntime::{NodeFactory, NodeMetadata};
use std::collections::HashMap;

fn find(input: &HashMap<String, Value>, field: &str) -> Option<Value> {
    for value in input.values() {
        if let Value::Object(ports) = value {
            if let Some(v) = ports.get(field) {
                return Some(v.clone());
            }
        }
    }
    None
}

/// Parses a `json` string input into a structured `Value::Json`.
pub struct JsonParseNode;

#[async_trait]
impl Node for JsonParseNode {
    fn node_type(&self) -> &str {
        "transform.json_parse"
    }

    async fn call(
        &self,
        input: HashMap<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutput, NodeOutcome> {
        let raw = find(&input, "json")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| NodeOutcome::Failure(NodeError::MissingInput("json".to_string())))?;
        let parsed: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| NodeOutcome::Failure(NodeError::ExecutionFailed(format!("JSON parse error: {e}"))))?;

        let mut values = HashMap::new();
        values.insert("parsed".to_string(), Value::from_json(parsed));
        Ok(NodeOutput::Standard(StandardOutput {
            values,
            ..Default::default()
        }))
    }
}

pub struct JsonParseNodeFactory;

impl NodeFactory for JsonParseNodeFactory {
    fn create(
        &self,
        _title: &str,
        _node_type: &flowcore::NodeType,
        _config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(JsonParseNode))
    }

    fn node_type(&self) -> &str {
        "transform.json_parse"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Parses a JSON string into a structured value".to_string(),
            category: "transform".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}

/// Serializes the assembled `value` input back to a JSON string.
pub struct JsonStringifyNode;

#[async_trait]
impl Node for JsonStringifyNode {
    fn node_type(&self) -> &str {
        "transform.json_stringify"
    }

    async fn call(
        &self,
        input: HashMap<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutput, NodeOutcome> {
        let value = find(&input, "value")
            .ok_or_else(|| NodeOutcome::Failure(NodeError::MissingInput("value".to_string())))?;
        let json = flowcore::serialize_value(&value);
        let json_str = serde_json::to_string_pretty(&json)
            .map_err(|e| NodeOutcome::Failure(NodeError::ExecutionFailed(format!("JSON stringify error: {e}"))))?;

        let mut values = HashMap::new();
        values.insert("json".to_string(), Value::String(json_str));
        Ok(NodeOutput::Standard(StandardOutput {
            values,
            ..Default::default()
        }))
    }
}

pub struct JsonStringifyNodeFactory;

impl NodeFactory for JsonStringifyNodeFactory {
    fn create(
        &self,
        _title: &str,
        _node_type: &flowcore::NodeType,
        _config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(JsonStringifyNode))
    }

    fn node_type(&self) -> &str {
        "transform.json_stringify"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Serializes a value to a JSON string".to_string(),
            category: "transform".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
