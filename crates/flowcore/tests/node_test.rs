// crates/flowcore/tests/node_test.rs

use flowcore::{Node, NodeError};

struct PassthroughNode;

#[async_trait::async_trait]
impl flowcore::Node for PassthroughNode {
    fn node_type(&self) -> &str {
        "passthrough"
    }

    async fn call(
        &self,
        input: std::collections::HashMap<String, flowcore::Value>,
        _ctx: &flowcore::ExecutionContext,
    ) -> Result<flowcore::NodeOutput, flowcore::NodeOutcome> {
        Ok(flowcore::NodeOutput::Standard(flowcore::StandardOutput {
            values: input,
            ..Default::default()
        }))
    }
}

#[test]
fn default_validate_output_parses_a_plain_json_object_as_standard_output() {
    let node = PassthroughNode;
    let raw = serde_json::json!({"answer": 42, "ok": true});
    let output = node.validate_output(&raw).unwrap();
    let values = output.values();
    assert_eq!(values.get("answer"), Some(&flowcore::Value::Number(42.0)));
    assert_eq!(values.get("ok"), Some(&flowcore::Value::Bool(true)));
}

#[test]
fn default_validate_output_rejects_non_object_json() {
    let node = PassthroughNode;
    let err = node.validate_output(&serde_json::json!([1, 2])).unwrap_err();
    assert!(matches!(err, NodeError::Configuration(_)));
}
