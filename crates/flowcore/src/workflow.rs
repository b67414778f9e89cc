use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Engine-significant node type tags plus an open slot for registry-owned
/// types. The scheduler branches only on the closed variants; everything
/// else is opaque to it and resolved entirely through the node registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeType {
    Input,
    Output,
    Router,
    Coalesce,
    HumanIntervention,
    Generic(String),
}

impl NodeType {
    fn as_str(&self) -> &str {
        match self {
            NodeType::Input => "InputNode",
            NodeType::Output => "OutputNode",
            NodeType::Router => "RouterNode",
            NodeType::Coalesce => "CoalesceNode",
            NodeType::HumanIntervention => "HumanInterventionNode",
            NodeType::Generic(name) => name,
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        match s {
            "InputNode" => NodeType::Input,
            "OutputNode" => NodeType::Output,
            "RouterNode" => NodeType::Router,
            "CoalesceNode" => NodeType::Coalesce,
            "HumanInterventionNode" => NodeType::HumanIntervention,
            other => NodeType::Generic(other.to_string()),
        }
    }
}

impl Serialize for NodeType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(NodeType::from(s.as_str()))
    }
}

/// A node as it appears in a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            node_type,
            config: HashMap::new(),
            parent_id: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// An edge between two nodes. `source_handle` names the router output port
/// the link reads from; required when `source_id` names a `RouterNode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub source_handle: Option<String>,
}

impl Link {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            source_handle: None,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }
}

/// A workflow graph: an ordered set of nodes and the links between them.
///
/// Node ordering is not semantically significant beyond determining
/// iteration order when reporting results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub nodes: Vec<WorkflowNode>,
    pub links: Vec<Link>,
    #[serde(default)]
    pub test_inputs: Vec<serde_json::Value>,
}

impl WorkflowDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn input_nodes(&self) -> impl Iterator<Item = &WorkflowNode> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Input && n.parent_id.is_none())
    }
}
