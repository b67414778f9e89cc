// crates/flowruntime/tests/loader_test.rs
//
// Graph loader: subworkflow hoisting, and the validation the scheduler
// leans on to never start against an invalid graph.

use flowcore::{Link, NodeType, Value, WorkflowDefinition, WorkflowNode};
use flowruntime::{check_reachable_from_input, load, LoaderError};
use std::collections::HashSet;

fn input_node(id: &str) -> WorkflowNode {
    WorkflowNode::new(id, NodeType::Input)
}

#[test]
fn hoists_child_nodes_into_the_parent_subworkflow_config() {
    let definition = WorkflowDefinition {
        nodes: vec![
            input_node("input"),
            WorkflowNode::new("group", NodeType::Generic("subflow.group".to_string())),
            WorkflowNode::new("inner_a", NodeType::Generic("debug.log".to_string())).with_parent("group"),
            WorkflowNode::new("inner_b", NodeType::Generic("debug.log".to_string())).with_parent("group"),
        ],
        links: vec![
            Link::new("input", "group"),
            Link::new("inner_a", "inner_b"),
        ],
        test_inputs: vec![],
    };

    let loaded = load(definition).expect("hoisting a well-formed subworkflow should succeed");

    assert!(
        loaded.nodes.iter().all(|n| n.parent_id.is_none()),
        "no node may carry a parent_id after loading"
    );
    assert_eq!(loaded.nodes.len(), 2, "child nodes are folded away, not kept top-level");

    let group = loaded.find_node("group").expect("the parent node survives hoisting");
    let subworkflow = group
        .config
        .get("subworkflow")
        .expect("the parent's config carries the hoisted subworkflow");
    let Value::Json(serde_json::Value::Object(sub)) = subworkflow else {
        panic!("subworkflow config should be the serialized child definition");
    };
    let sub_links = sub.get("links").and_then(|v| v.as_array()).expect("links array");
    assert_eq!(sub_links.len(), 1, "exactly the one intra-group link should have been hoisted");

    assert_eq!(
        loaded.links.len(),
        1,
        "only the top-level input->group link should remain; the child link left with the children"
    );
}

#[test]
fn dangling_link_is_rejected() {
    let definition = WorkflowDefinition {
        nodes: vec![input_node("input")],
        links: vec![Link::new("input", "nowhere")],
        test_inputs: vec![],
    };

    let err = load(definition).unwrap_err();
    assert!(matches!(err, LoaderError::DanglingLink(id) if id == "nowhere"));
}

#[test]
fn router_link_naming_an_undeclared_handle_is_rejected() {
    let router = WorkflowNode::new("router", NodeType::Router).with_config(
        "handles",
        Value::Array(vec![Value::String("yes".to_string())]),
    );

    let definition = WorkflowDefinition {
        nodes: vec![
            input_node("input"),
            router,
            WorkflowNode::new("consumer", NodeType::Output),
        ],
        links: vec![
            Link::new("input", "router"),
            Link::new("router", "consumer").with_handle("no"),
        ],
        test_inputs: vec![],
    };

    let err = load(definition).unwrap_err();
    assert!(matches!(err, LoaderError::UnknownRouterHandle { handle, .. } if handle == "no"));
}

#[test]
fn router_link_with_no_source_handle_is_rejected() {
    let router = WorkflowNode::new("router", NodeType::Router).with_config(
        "handles",
        Value::Array(vec![Value::String("yes".to_string())]),
    );

    let definition = WorkflowDefinition {
        nodes: vec![
            input_node("input"),
            router,
            WorkflowNode::new("consumer", NodeType::Output),
        ],
        links: vec![Link::new("input", "router"), Link::new("router", "consumer")],
        test_inputs: vec![],
    };

    let err = load(definition).unwrap_err();
    assert!(
        matches!(err, LoaderError::MissingRouterHandle { source_id, target_id }
            if source_id == "router" && target_id == "consumer"),
        "a link out of a router with no source_handle must fail to load, not silently cancel the consumer at runtime"
    );
}

#[test]
fn zero_input_nodes_is_rejected() {
    let definition = WorkflowDefinition {
        nodes: vec![WorkflowNode::new("only", NodeType::Output)],
        links: vec![],
        test_inputs: vec![],
    };

    let err = load(definition).unwrap_err();
    assert!(matches!(err, LoaderError::InputNodeCount(0)));
}

#[test]
fn multiple_input_nodes_is_rejected() {
    let definition = WorkflowDefinition {
        nodes: vec![input_node("a"), input_node("b")],
        links: vec![],
        test_inputs: vec![],
    };

    let err = load(definition).unwrap_err();
    assert!(matches!(err, LoaderError::InputNodeCount(2)));
}

#[test]
fn a_cycle_among_top_level_nodes_is_rejected() {
    let definition = WorkflowDefinition {
        nodes: vec![
            input_node("input"),
            WorkflowNode::new("a", NodeType::Generic("debug.log".to_string())),
            WorkflowNode::new("b", NodeType::Generic("debug.log".to_string())),
        ],
        links: vec![
            Link::new("input", "a"),
            Link::new("a", "b"),
            Link::new("b", "a"),
        ],
        test_inputs: vec![],
    };

    let err = load(definition).unwrap_err();
    assert!(matches!(err, LoaderError::CyclicDependency(_)));
}

#[test]
fn restricting_a_run_to_an_unreachable_node_is_rejected_before_any_task_spawns() {
    let definition = WorkflowDefinition {
        nodes: vec![
            input_node("input"),
            WorkflowNode::new("connected", NodeType::Output),
            WorkflowNode::new("orphaned", NodeType::Output),
        ],
        links: vec![Link::new("input", "connected")],
        test_inputs: vec![],
    };

    let loaded = load(definition).expect("this graph is otherwise valid");

    let target: HashSet<String> = ["orphaned".to_string()].into_iter().collect();
    let err = check_reachable_from_input(&loaded, &target).unwrap_err();
    assert!(matches!(err, LoaderError::UnreachableNode(id) if id == "orphaned"));

    let target: HashSet<String> = ["connected".to_string()].into_iter().collect();
    check_reachable_from_input(&loaded, &target).expect("a reachable target should pass");
}
