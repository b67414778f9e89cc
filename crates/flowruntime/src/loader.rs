use crate::error::LoaderError;
use flowcore::{Link, NodeType, Value, WorkflowDefinition, WorkflowNode};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};

/// Fold child nodes into their parent's `config["subworkflow"]` and return
/// the flattened top-level definition, validated and ready for the
/// scheduler.
///
/// Mirrors the hoisting step the workflow executor this engine is modeled
/// on performs before execution: nodes with a `parent_id` are not run
/// directly, they become the body of whichever node groups them.
pub fn load(raw: WorkflowDefinition) -> Result<WorkflowDefinition, LoaderError> {
    let hoisted = hoist_subworkflows(raw)?;
    validate(&hoisted)?;
    Ok(hoisted)
}

fn hoist_subworkflows(raw: WorkflowDefinition) -> Result<WorkflowDefinition, LoaderError> {
    let mut children_by_parent: HashMap<String, Vec<WorkflowNode>> = HashMap::new();
    let mut top_level: Vec<WorkflowNode> = Vec::new();

    for node in raw.nodes {
        match node.parent_id.clone() {
            Some(parent_id) => children_by_parent.entry(parent_id).or_default().push(node),
            None => top_level.push(node),
        }
    }

    let mut seen = HashSet::new();
    for node in &top_level {
        if !seen.insert(node.id.clone()) {
            return Err(LoaderError::DuplicateNodeId(node.id.clone()));
        }
    }

    let top_level_ids: HashSet<&str> = top_level.iter().map(|n| n.id.as_str()).collect();

    let top_level_links: Vec<Link> = raw
        .links
        .iter()
        .filter(|l| top_level_ids.contains(l.source_id.as_str()) && top_level_ids.contains(l.target_id.as_str()))
        .cloned()
        .collect();

    let nodes = top_level
        .into_iter()
        .map(|mut node| {
            if let Some(children) = children_by_parent.remove(&node.id) {
                let child_ids: HashSet<&str> = children.iter().map(|n| n.id.as_str()).collect();
                let child_links: Vec<Link> = raw
                    .links
                    .iter()
                    .filter(|l| child_ids.contains(l.source_id.as_str()) && child_ids.contains(l.target_id.as_str()))
                    .cloned()
                    .collect();
                let sub = WorkflowDefinition {
                    nodes: children,
                    links: child_links,
                    test_inputs: Vec::new(),
                };
                let json = serde_json::to_value(&sub).expect("workflow definition always serializes");
                node.config.insert("subworkflow".to_string(), Value::Json(json));
            }
            node
        })
        .collect();

    Ok(WorkflowDefinition {
        nodes,
        links: top_level_links,
        test_inputs: raw.test_inputs,
    })
}

fn validate(def: &WorkflowDefinition) -> Result<(), LoaderError> {
    let node_ids: HashSet<&str> = def.nodes.iter().map(|n| n.id.as_str()).collect();

    for link in &def.links {
        if !node_ids.contains(link.source_id.as_str()) {
            return Err(LoaderError::DanglingLink(link.source_id.clone()));
        }
        if !node_ids.contains(link.target_id.as_str()) {
            return Err(LoaderError::DanglingLink(link.target_id.clone()));
        }
    }

    validate_router_handles(def)?;

    let input_count = def.input_nodes().count();
    if input_count != 1 {
        return Err(LoaderError::InputNodeCount(input_count));
    }

    check_acyclic(def)?;

    Ok(())
}

fn validate_router_handles(def: &WorkflowDefinition) -> Result<(), LoaderError> {
    for link in &def.links {
        let source = def
            .find_node(&link.source_id)
            .expect("link endpoints validated against node_ids above");

        if source.node_type != NodeType::Router {
            continue;
        }

        let handle = match &link.source_handle {
            Some(handle) if !handle.is_empty() => handle,
            _ => {
                return Err(LoaderError::MissingRouterHandle {
                    source_id: source.id.clone(),
                    target_id: link.target_id.clone(),
                })
            }
        };

        let declared = declared_handles(source);
        if !declared.iter().any(|h| h == handle) {
            return Err(LoaderError::UnknownRouterHandle {
                source_id: source.id.clone(),
                source_type: source.node_type.to_string(),
                handle: handle.clone(),
            });
        }
    }
    Ok(())
}

fn declared_handles(node: &WorkflowNode) -> Vec<String> {
    match node.config.get("handles") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn check_acyclic(def: &WorkflowDefinition) -> Result<(), LoaderError> {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut index_of = HashMap::new();
    for node in &def.nodes {
        index_of.insert(node.id.as_str(), graph.add_node(node.id.as_str()));
    }
    for link in &def.links {
        graph.add_edge(index_of[link.source_id.as_str()], index_of[link.target_id.as_str()], ());
    }
    if let Err(cycle) = toposort(&graph, None) {
        let offender = graph[cycle.node_id()].to_string();
        return Err(LoaderError::CyclicDependency(vec![offender]));
    }
    Ok(())
}

/// Check that every id in `target_ids` is reachable from the definition's
/// input node. Used when a run is restricted to a subset of nodes
/// (`node_ids` on `Scheduler::run`) — a target outside the input node's
/// reachable set can never receive data and would hang forever waiting on
/// inputs that never arrive.
pub fn check_reachable_from_input(
    def: &WorkflowDefinition,
    target_ids: &HashSet<String>,
) -> Result<(), LoaderError> {
    let input = def
        .input_nodes()
        .next()
        .expect("validated definitions always have exactly one input node");

    let mut forward: HashMap<&str, Vec<&str>> = HashMap::new();
    for link in &def.links {
        forward
            .entry(link.source_id.as_str())
            .or_default()
            .push(link.target_id.as_str());
    }

    let mut reachable = HashSet::new();
    let mut stack = vec![input.id.as_str()];
    while let Some(id) = stack.pop() {
        if reachable.insert(id) {
            if let Some(next) = forward.get(id) {
                stack.extend(next.iter().copied());
            }
        }
    }

    for target in target_ids {
        if !reachable.contains(target.as_str()) {
            return Err(LoaderError::UnreachableNode(target.clone()));
        }
    }
    Ok(())
}
