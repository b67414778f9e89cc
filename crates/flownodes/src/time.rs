use async_trait::async_trait;
use flowcore::{ExecutionContext, Node, NodeOutcome, NodeOutput, StandardOutput, Value};
use flowruntime::{NodeFactory, NodeMetadata};
use std::collections::HashMap;
use tokio::time::{sleep, Duration};

/// Sleeps for a fixed duration, then passes its inputs through unchanged.
/// `delay_ms` is a wiring-time config value, not per-run data.
pub struct DelayNode {
    delay_ms: u64,
}

impl DelayNode {
    pub fn new(config: &HashMap<String, Value>) -> Self {
        let delay_ms = config
            .get("delay_ms")
            .and_then(Value::as_f64)
            .unwrap_or(1000.0) as u64;
        Self { delay_ms }
    }
}

#[async_trait]
impl Node for DelayNode {
    fn node_type(&self) -> &str {
        "time.delay"
    }

    async fn call(
        &self,
        input: HashMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutput, NodeOutcome> {
        ctx.events.info(format!("delaying for {}ms", self.delay_ms));
        sleep(Duration::from_millis(self.delay_ms)).await;
        Ok(NodeOutput::Standard(StandardOutput {
            values: input,
            ..Default::default()
        }))
    }
}

pub struct DelayNodeFactory;

impl NodeFactory for DelayNodeFactory {
    fn create(
        &self,
        _title: &str,
        _node_type: &flowcore::NodeType,
        config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, flowcore::NodeError> {
        Ok(Box::new(DelayNode::new(config)))
    }

    fn node_type(&self) -> &str {
        "time.delay"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Delays execution for a configured number of milliseconds".to_string(),
            category: "time".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
