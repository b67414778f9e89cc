use async_trait::async_trait;
use flowcore::{ExecutionContext, Node, NodeError, NodeOutcome, NodeOutput, StandardOutput, Value};
use flowruntime::{NodeFactory, NodeMetadata};
use std::collections::HashMap;

/// Issues a single HTTP request. `url` and an optional `body` come from the
/// assembled input; `method` and `headers` are fixed at construction time
/// via config, since they describe the node's wiring rather than per-run data.
pub struct HttpRequestNode {
    client: reqwest::Client,
    method: String,
    headers: HashMap<String, String>,
}

impl HttpRequestNode {
    pub fn new(config: &HashMap<String, Value>) -> Self {
        let method = config
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();
        let headers = match config.get("headers") {
            Some(Value::Object(map)) => map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect(),
            _ => HashMap::new(),
        };
        Self {
            client: reqwest::Client::new(),
            method,
            headers,
        }
    }

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
}

#[async_trait]
impl Node for HttpRequestNode {
    fn node_type(&self) -> &str {
        "http.request"
    }

    async fn call(
        &self,
        input: HashMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutput, NodeOutcome> {
        let url = Self::find(&input, "url")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| NodeOutcome::Failure(NodeError::MissingInput("url".to_string())))?;

        ctx.events.info(format!("{} {}", self.method, url));

        let mut request = match self.method.as_str() {
            "GET" => self.client.get(&url),
            "DELETE" => self.client.delete(&url),
            "POST" | "PUT" | "PATCH" => {
                let builder = match self.method.as_str() {
                    "POST" => self.client.post(&url),
                    "PUT" => self.client.put(&url),
                    _ => self.client.patch(&url),
                };
                match Self::find(&input, "body") {
                    Some(Value::Json(json)) => builder.json(&json),
                    Some(other) if other.as_str().is_some() => builder.body(other.as_str().unwrap().to_string()),
                    _ => builder,
                }
            }
            other => {
                return Err(NodeOutcome::Failure(NodeError::Configuration(format!(
                    "unsupported HTTP method: {other}"
                ))))
            }
        };

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NodeOutcome::Failure(NodeError::ExecutionFailed(format!("HTTP request failed: {e}"))))?;

        let status = response.status().as_u16();
        let headers_map: HashMap<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or("").to_string())))
            .collect();
        let body_text = response
            .text()
            .await
            .map_err(|e| NodeOutcome::Failure(NodeError::ExecutionFailed(format!("failed to read response: {e}"))))?;

        ctx.events.info(format!("response status: {status}"));

        let mut values = HashMap::new();
        values.insert("status".to_string(), Value::Number(status as f64));
        values.insert("body".to_string(), Value::String(body_text));
        values.insert("headers".to_string(), Value::Object(headers_map));

        Ok(NodeOutput::Standard(StandardOutput {
            values,
            ..Default::default()
        }))
    }
}

pub struct HttpRequestNodeFactory;

impl NodeFactory for HttpRequestNodeFactory {
    fn create(
        &self,
        _title: &str,
        _node_type: &flowcore::NodeType,
        config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(HttpRequestNode::new(config)))
    }

    fn node_type(&self) -> &str {
        "http.request"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Makes an HTTP request".to_string(),
            category: "http".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
