// crates/flowcore/tests/value_test.rs

use flowcore::{NodeType, Value, WorkflowNode};
use std::collections::HashMap;

#[test]
fn value_round_trips_as_plain_json() {
    let mut object = HashMap::new();
    object.insert("name".to_string(), Value::String("ada".to_string()));
    object.insert("age".to_string(), Value::Number(36.0));
    object.insert("active".to_string(), Value::Bool(true));
    object.insert("tags".to_string(), Value::Array(vec![Value::String("a".to_string())]));
    let original = Value::Object(object);

    let json = serde_json::to_value(&original).unwrap();
    assert!(json.is_object(), "Value must serialize as a plain JSON object, not a tagged envelope");
    assert_eq!(json["name"], serde_json::json!("ada"));
    assert_eq!(json["age"], serde_json::json!(36.0));

    let round_tripped: Value = serde_json::from_value(json).unwrap();
    assert_eq!(round_tripped, original);
}

#[test]
fn workflow_node_config_is_plain_json_not_a_tagged_value() {
    let raw = serde_json::json!({
        "id": "n1",
        "title": "greeter",
        "node_type": "greeter.custom",
        "config": {"greeting": "hello", "times": 3}
    });
    let node: WorkflowNode = serde_json::from_value(raw).unwrap();
    assert_eq!(node.node_type, NodeType::Generic("greeter.custom".to_string()));
    assert_eq!(node.config.get("greeting"), Some(&Value::String("hello".to_string())));
    assert_eq!(node.config.get("times"), Some(&Value::Number(3.0)));
}

#[test]
fn map_from_json_object_rejects_non_objects() {
    let err = Value::map_from_json_object(&serde_json::json!([1, 2, 3])).unwrap_err();
    assert!(err.contains("expected a JSON object"));
}

#[test]
fn null_is_distinguishable_from_missing() {
    let v = Value::from_json(serde_json::Value::Null);
    assert!(v.is_null());
    assert_eq!(v.as_str(), None);
}
