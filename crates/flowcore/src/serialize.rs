use crate::node::{HumanInterventionOutput, NodeOutput, RouterOutput, StandardOutput};
use crate::value::Value;
use std::collections::HashMap;

/// Normalize a dynamic `Value` into plain JSON, the form the task recorder
/// and API responses actually persist.
///
/// `Value::Bytes` has no lossless JSON representation; it is hex-encoded
/// rather than silently dropped.
pub fn serialize_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::String(hex_encode(b)),
        Value::Json(j) => j.clone(),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(serialize_value).collect()),
        Value::Object(map) => serialize_value_map(map),
    }
}

/// Serialize a `HashMap<String, Value>` with keys sorted lexicographically,
/// so two runs over the same logical output always produce byte-identical
/// JSON regardless of hash-map iteration order.
pub fn serialize_value_map(map: &HashMap<String, Value>) -> serde_json::Value {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    let mut obj = serde_json::Map::with_capacity(map.len());
    for key in keys {
        obj.insert(key.clone(), serialize_value(&map[key]));
    }
    serde_json::Value::Object(obj)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn serialize_standard(output: &StandardOutput) -> serde_json::Value {
    serialize_value_map(&output.values)
}

fn serialize_router(output: &RouterOutput) -> serde_json::Value {
    let mut handles: Vec<&String> = output.routes.keys().collect();
    handles.sort();
    let mut obj = serde_json::Map::with_capacity(output.routes.len());
    for handle in handles {
        let v = match &output.routes[handle] {
            Some(v) => serialize_value(v),
            None => serde_json::Value::Null,
        };
        obj.insert(handle.clone(), v);
    }
    serde_json::Value::Object(obj)
}

fn serialize_human_intervention(output: &HumanInterventionOutput) -> serde_json::Value {
    let mut blocked: Vec<&String> = output.blocked_nodes.iter().collect();
    blocked.sort();

    let mut obj = serde_json::Map::new();
    obj.insert(
        "blocked_nodes".to_string(),
        serde_json::Value::Array(
            blocked
                .into_iter()
                .map(|n| serde_json::Value::String(n.clone()))
                .collect(),
        ),
    );
    obj.insert(
        "resume_time".to_string(),
        match output.resume_time {
            Some(t) => serde_json::Value::String(t.to_rfc3339()),
            None => serde_json::Value::Null,
        },
    );
    obj.insert("values".to_string(), serialize_value_map(&output.values));
    serde_json::Value::Object(obj)
}

/// Entry point used by `NodeOutput::serialize()`. Dispatches on the output's
/// variant; the wire shape this produces is what the task recorder and the
/// HTTP/CLI surfaces actually see — the `kind` discriminant used by
/// `NodeOutput`'s own `Serialize` impl is not part of it, since recorded
/// outputs are read back as data, not reconstructed as `NodeOutput`.
pub fn serialize_node_output(output: &NodeOutput) -> serde_json::Value {
    match output {
        NodeOutput::Standard(s) => serialize_standard(s),
        NodeOutput::Router(r) => serialize_router(r),
        NodeOutput::HumanIntervention(h) => serialize_human_intervention(h),
    }
}
