use crate::error::RegistryError;
use flowcore::{Node, NodeType, Value, WorkflowNode};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating node instances. One factory is registered per
/// `NodeType::Generic` name (or per closed-set engine type, for the
/// built-ins flowruntime wires up itself).
pub trait NodeFactory: Send + Sync {
    /// Construct a node instance for a specific workflow node.
    fn create(
        &self,
        title: &str,
        node_type: &NodeType,
        config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, flowcore::NodeError>;

    /// Registry key this factory is registered under.
    fn node_type(&self) -> &str;

    /// Optional: description, input/output schema, etc.
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::default()
    }
}

#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub description: String,
    pub category: String,
    pub inputs: Vec<PortDefinition>,
    pub outputs: Vec<PortDefinition>,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortDefinition {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// Registry of available node types, keyed by the string form of
/// `NodeType` (`"RouterNode"`, `"http.request"`, ...).
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.node_type().to_string();
        tracing::info!("Registering node type: {}", node_type);
        self.factories.insert(node_type, factory);
    }

    /// Create a node instance for a given workflow node.
    pub fn create_node(&self, node: &WorkflowNode) -> Result<Box<dyn Node>, RegistryError> {
        let key = node.node_type.to_string();
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| RegistryError::UnknownNodeType(key.clone()))?;

        factory
            .create(&node.title, &node.node_type, &node.config)
            .map_err(|e| RegistryError::Construction {
                node_id: node.id.clone(),
                node_type: key,
                source: e,
            })
    }

    pub fn list_node_types(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn get_metadata(&self, node_type: &str) -> Option<NodeMetadata> {
        self.factories.get(node_type).map(|f| f.metadata())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
