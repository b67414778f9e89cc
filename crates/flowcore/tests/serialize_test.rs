// crates/flowcore/tests/serialize_test.rs

use flowcore::{serialize_node_output, serialize_value_map, NodeOutput, RouterOutput, StandardOutput, Value};
use std::collections::HashMap;

#[test]
fn serialize_value_map_sorts_keys_for_deterministic_output() {
    let mut map = HashMap::new();
    map.insert("zebra".to_string(), Value::Number(1.0));
    map.insert("apple".to_string(), Value::Number(2.0));
    let json = serialize_value_map(&map);
    let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["apple", "zebra"]);
}

#[test]
fn standard_output_serializes_as_plain_object_not_tagged_kind() {
    let mut values = HashMap::new();
    values.insert("greeting".to_string(), Value::String("hi".to_string()));
    let output = NodeOutput::Standard(StandardOutput {
        values,
        ..Default::default()
    });
    let json = serialize_node_output(&output);
    assert_eq!(json, serde_json::json!({"greeting": "hi"}));
    assert!(json.get("kind").is_none());
}

#[test]
fn router_output_serializes_one_key_per_handle_with_unselected_as_null() {
    let mut output = RouterOutput::new(["approve", "reject"].iter().map(|s| s.to_string()));
    output = output.select("approve", Value::String("ok".to_string()));
    let json = serialize_node_output(&NodeOutput::Router(output));
    assert_eq!(json["approve"], serde_json::json!("ok"));
    assert_eq!(json["reject"], serde_json::Value::Null);
}

#[test]
fn bytes_are_hex_encoded_rather_than_dropped() {
    let mut values = HashMap::new();
    values.insert("blob".to_string(), Value::Bytes(vec![0xde, 0xad, 0xbe, 0xef]));
    let json = serialize_value_map(&values);
    assert_eq!(json["blob"], serde_json::json!("deadbeef"));
}
