use async_trait::async_trait;
use chrono::Utc;
use flowcore::{
    ExecutionContext, HumanInterventionOutput, Node, NodeError, NodeOutcome, NodeOutput,
    OutputSchema, PauseSignal, StandardOutput, Value,
};
use flowruntime::{NodeFactory, NodeMetadata};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Where an external approval event (a human clicking "approve", a
/// scheduled timeout) lands so a paused `HumanInterventionNode` can observe
/// it on its next invocation. Driving this registry — who calls `resume`,
/// over what transport — is the resume *trigger*, which is out of the
/// engine's scope; this is only the handoff point a node implementation
/// needs to cooperate with the scheduler's pause protocol.
#[derive(Default)]
pub struct ResumeRegistry {
    resumed: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl ResumeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resume(&self, key: &str, payload: HashMap<String, Value>) {
        self.resumed.lock().unwrap().insert(key.to_string(), payload);
    }

    fn check(&self, key: &str) -> Option<HashMap<String, Value>> {
        self.resumed.lock().unwrap().get(key).cloned()
    }
}

/// Parks a run until an external event resumes it. `blocked_nodes` names
/// the downstream node ids that must wait; the scheduler reads this set
/// directly off the paused `HumanInterventionOutput` to gate them (it does
/// not need a BFS — every blocked node is named explicitly).
///
/// Identified for resume purposes by its title, since a node instance has
/// no other stable handle on its own id (the registry resolves `(node_type,
/// config)` to an instance without passing the node id through).
pub struct HumanInterventionNode {
    key: String,
    blocked_nodes: HashSet<String>,
    registry: std::sync::Arc<ResumeRegistry>,
}

#[async_trait]
impl Node for HumanInterventionNode {
    fn node_type(&self) -> &str {
        "HumanInterventionNode"
    }

    async fn call(
        &self,
        input: HashMap<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutput, NodeOutcome> {
        match self.registry.check(&self.key) {
            Some(payload) => {
                let mut values = input;
                values.extend(payload);
                Ok(NodeOutput::Standard(StandardOutput {
                    values,
                    ..Default::default()
                }))
            }
            None => Err(NodeOutcome::Pause(PauseSignal {
                node_id: self.key.clone(),
                output: NodeOutput::HumanIntervention(HumanInterventionOutput::paused(
                    self.blocked_nodes.iter().cloned(),
                )),
            })),
        }
    }

    fn output_schema(&self) -> OutputSchema {
        OutputSchema {
            is_router: false,
            router_handles: Vec::new(),
            is_human_intervention: true,
        }
    }

    fn validate_output(&self, raw: &serde_json::Value) -> Result<NodeOutput, NodeError> {
        let obj = raw.as_object().ok_or_else(|| {
            NodeError::Configuration("human intervention precomputed output must be an object".to_string())
        })?;
        let blocked_nodes = obj
            .get("blocked_nodes")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let resume_time = match obj.get("resume_time") {
            Some(serde_json::Value::String(s)) => Some(
                chrono::DateTime::parse_from_rfc3339(s)
                    .map_err(|e| NodeError::Configuration(format!("invalid resume_time: {e}")))?
                    .with_timezone(&Utc),
            ),
            _ => None,
        };
        let values = obj
            .get("values")
            .map(Value::map_from_json_object)
            .transpose()
            .map_err(NodeError::Configuration)?
            .unwrap_or_default();
        Ok(NodeOutput::HumanIntervention(HumanInterventionOutput {
            blocked_nodes,
            resume_time,
            values,
        }))
    }
}

pub struct HumanInterventionNodeFactory {
    registry: std::sync::Arc<ResumeRegistry>,
}

impl HumanInterventionNodeFactory {
    pub fn new(registry: std::sync::Arc<ResumeRegistry>) -> Self {
        Self { registry }
    }
}

impl NodeFactory for HumanInterventionNodeFactory {
    fn create(
        &self,
        title: &str,
        _node_type: &flowcore::NodeType,
        config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, NodeError> {
        let blocked_nodes = match config.get("blocked_nodes") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => HashSet::new(),
        };
        Ok(Box::new(HumanInterventionNode {
            key: title.to_string(),
            blocked_nodes,
            registry: self.registry.clone(),
        }))
    }

    fn node_type(&self) -> &str {
        "HumanInterventionNode"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Pauses the run until an external event resumes it".to_string(),
            category: "control".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
