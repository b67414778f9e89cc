// crates/flowruntime/tests/scheduler_test.rs
//
// End-to-end scenarios driving the scheduler over small hand-built
// workflow definitions: linear happy path, router branching, upstream
// failure propagation, human-intervention pause/resume, coalesce fan-in
// with a routed-away branch, and precomputed-output replay.

use async_trait::async_trait;
use flowcore::{
    EventBus, ExecutionContext, Link, Node, NodeError, NodeOutcome, NodeOutput, NodeType,
    StandardOutput, Value, WorkflowDefinition, WorkflowNode,
};
use flowruntime::{
    InMemoryRunStore, InMemoryTaskRecorder, NodeFactory, NodeRegistry, RunError, RunOptions, Scheduler,
    TaskStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A test node that always fails, so the upstream-failure propagation path
/// can be exercised without reaching outside the process.
struct FailingNode;

#[async_trait]
impl Node for FailingNode {
    fn node_type(&self) -> &str {
        "test.failing"
    }

    async fn call(
        &self,
        _input: HashMap<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutput, NodeOutcome> {
        Err(NodeOutcome::Failure(NodeError::ExecutionFailed("intentional test failure".to_string())))
    }
}

struct FailingNodeFactory;

impl NodeFactory for FailingNodeFactory {
    fn create(
        &self,
        _title: &str,
        _node_type: &NodeType,
        _config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(FailingNode))
    }

    fn node_type(&self) -> &str {
        "test.failing"
    }
}

/// A test node that counts how many times it actually ran, so a
/// precomputed-output replay can be told apart from a real execution.
struct CountingNode {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Node for CountingNode {
    fn node_type(&self) -> &str {
        "test.counting"
    }

    async fn call(
        &self,
        input: HashMap<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutput, NodeOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(NodeOutput::Standard(StandardOutput {
            values: input,
            ..Default::default()
        }))
    }
}

struct CountingNodeFactory {
    calls: Arc<AtomicUsize>,
}

impl NodeFactory for CountingNodeFactory {
    fn create(
        &self,
        _title: &str,
        _node_type: &NodeType,
        _config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(CountingNode {
            calls: self.calls.clone(),
        }))
    }

    fn node_type(&self) -> &str {
        "test.counting"
    }
}

fn base_registry() -> Arc<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    flownodes::register_all(&mut registry);
    Arc::new(registry)
}

fn scheduler(registry: Arc<NodeRegistry>) -> Scheduler {
    Scheduler::new(
        registry,
        Arc::new(InMemoryTaskRecorder::new()),
        Arc::new(InMemoryRunStore::new()),
        Arc::new(EventBus::new(64)),
    )
}

fn input_node() -> WorkflowNode {
    WorkflowNode::new("input", NodeType::Input)
}

#[tokio::test]
async fn linear_happy_path_runs_every_node_to_completion() {
    let definition = WorkflowDefinition {
        nodes: vec![
            input_node(),
            WorkflowNode::new("debug", NodeType::Generic("debug.log".to_string())),
            WorkflowNode::new("output", NodeType::Output),
        ],
        links: vec![Link::new("input", "debug"), Link::new("debug", "output")],
        test_inputs: vec![],
    };

    let mut initial = HashMap::new();
    initial.insert("message".to_string(), Value::String("hello".to_string()));

    let outputs = scheduler(base_registry())
        .run(definition, initial, RunOptions::default())
        .await
        .expect("linear workflow should complete");

    let output_payload = &outputs["output"];
    assert_eq!(output_payload["input"]["message"], serde_json::json!("hello"));
}

#[tokio::test]
async fn router_selects_exactly_one_branch() {
    let router = WorkflowNode::new("router", NodeType::Router)
        .with_config(
            "handles",
            Value::Array(vec![Value::String("approve".to_string()), Value::String("reject".to_string())]),
        )
        .with_config("selector", Value::String("decision".to_string()));

    let definition = WorkflowDefinition {
        nodes: vec![
            input_node(),
            router,
            WorkflowNode::new("approved", NodeType::Output),
            WorkflowNode::new("rejected", NodeType::Output),
        ],
        links: vec![
            Link::new("input", "router"),
            Link::new("router", "approved").with_handle("approve"),
            Link::new("router", "rejected").with_handle("reject"),
        ],
        test_inputs: vec![],
    };

    let mut initial = HashMap::new();
    initial.insert("decision".to_string(), Value::String("approve".to_string()));

    let outputs = scheduler(base_registry())
        .run(definition, initial, RunOptions::default())
        .await
        .expect("routed workflow should complete");

    assert!(outputs.contains_key("approved"), "the taken branch must produce output");
    assert!(
        !outputs.contains_key("rejected"),
        "the branch that was not selected must be canceled, not present in outputs"
    );
}

#[tokio::test]
async fn failure_propagates_to_every_downstream_node() {
    let registry = base_registry();
    let mut registry = Arc::try_unwrap(registry).unwrap_or_else(|_| unreachable!());
    registry.register(Arc::new(FailingNodeFactory));
    let registry = Arc::new(registry);

    let definition = WorkflowDefinition {
        nodes: vec![
            input_node(),
            WorkflowNode::new("boom", NodeType::Generic("test.failing".to_string())),
            WorkflowNode::new("output", NodeType::Output),
        ],
        links: vec![Link::new("input", "boom"), Link::new("boom", "output")],
        test_inputs: vec![],
    };

    let mut initial = HashMap::new();
    initial.insert("x".to_string(), Value::Number(1.0));

    let err = scheduler(registry)
        .run(definition, initial, RunOptions::default())
        .await
        .expect_err("a failing upstream node must fail the run");

    match err {
        RunError::Failed(message) => assert!(message.contains("boom") || message.contains("intentional")),
        other => panic!("expected RunError::Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn human_intervention_pauses_then_resumes_with_the_registry_payload() {
    let mut registry = NodeRegistry::new();
    let resume_registry = flownodes::register_all(&mut registry);
    let registry = Arc::new(registry);

    let gate = WorkflowNode::new("gate", NodeType::HumanIntervention).with_config(
        "blocked_nodes",
        Value::Array(vec![Value::String("output".to_string())]),
    );

    let definition = WorkflowDefinition {
        nodes: vec![input_node(), gate, WorkflowNode::new("output", NodeType::Output)],
        links: vec![Link::new("input", "gate"), Link::new("gate", "output")],
        test_inputs: vec![],
    };

    let mut initial = HashMap::new();
    initial.insert("payload".to_string(), Value::String("waiting".to_string()));

    let run = scheduler(registry.clone())
        .run(definition.clone(), initial.clone(), RunOptions::default())
        .await;

    let (node_id, outputs) = match run {
        Err(RunError::Paused { node_id, outputs }) => (node_id, outputs),
        other => panic!("expected a pause, got {other:?}"),
    };
    assert_eq!(node_id, "gate");
    assert!(!outputs.contains_key("output"), "the blocked node must not have run yet");

    // The gate node has no title, so the human-intervention factory (which
    // has no other handle on a node's identity) keys its resume registry by
    // the empty string here.
    resume_registry.resume("", HashMap::new());

    let resumed = scheduler(registry)
        .run(definition, initial, RunOptions::default())
        .await
        .expect("resumed run should complete");
    assert!(resumed.contains_key("output"));
}

#[tokio::test]
async fn coalesce_tolerates_a_routed_away_sibling() {
    let router = WorkflowNode::new("router", NodeType::Router)
        .with_config(
            "handles",
            Value::Array(vec![Value::String("left".to_string()), Value::String("right".to_string())]),
        )
        .with_config("selector", Value::String("branch".to_string()));

    let definition = WorkflowDefinition {
        nodes: vec![
            input_node(),
            router,
            WorkflowNode::new("left_branch", NodeType::Generic("debug.log".to_string())),
            WorkflowNode::new("right_branch", NodeType::Generic("debug.log".to_string())),
            WorkflowNode::new("join", NodeType::Coalesce),
            WorkflowNode::new("output", NodeType::Output),
        ],
        links: vec![
            Link::new("input", "router"),
            Link::new("router", "left_branch").with_handle("left"),
            Link::new("router", "right_branch").with_handle("right"),
            Link::new("left_branch", "join"),
            Link::new("right_branch", "join"),
            Link::new("join", "output"),
        ],
        test_inputs: vec![],
    };

    let mut initial = HashMap::new();
    initial.insert("branch".to_string(), Value::String("left".to_string()));

    let outputs = scheduler(base_registry())
        .run(definition, initial, RunOptions::default())
        .await
        .expect("coalesce must not cancel just because one predecessor routed away");

    assert!(outputs.contains_key("output"));
    assert!(
        !outputs.contains_key("right_branch"),
        "the node downstream of the unselected handle must be canceled"
    );
}

#[tokio::test]
async fn precomputed_output_skips_re_executing_the_node() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = base_registry();
    let mut registry = Arc::try_unwrap(registry).unwrap_or_else(|_| unreachable!());
    registry.register(Arc::new(CountingNodeFactory { calls: calls.clone() }));
    let registry = Arc::new(registry);

    let definition = WorkflowDefinition {
        nodes: vec![
            input_node(),
            WorkflowNode::new("counted", NodeType::Generic("test.counting".to_string())),
            WorkflowNode::new("output", NodeType::Output),
        ],
        links: vec![Link::new("input", "counted"), Link::new("counted", "output")],
        test_inputs: vec![],
    };

    let mut initial = HashMap::new();
    initial.insert("value".to_string(), Value::Number(7.0));

    let first = scheduler(registry.clone())
        .run(definition.clone(), initial.clone(), RunOptions::default())
        .await
        .expect("first run should complete");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let recorded_output = first["counted"].clone();
    let mut precomputed = HashMap::new();
    precomputed.insert("counted".to_string(), recorded_output);

    let options = RunOptions {
        precomputed_outputs: precomputed,
        ..RunOptions::default()
    };
    scheduler(registry)
        .run(definition, initial, options)
        .await
        .expect("replayed run should complete");

    assert_eq!(calls.load(Ordering::SeqCst), 1, "the node must not run a second time");
}

#[tokio::test]
async fn a_shared_producer_behind_two_consumers_runs_exactly_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = base_registry();
    let mut registry = Arc::try_unwrap(registry).unwrap_or_else(|_| unreachable!());
    registry.register(Arc::new(CountingNodeFactory { calls: calls.clone() }));
    let registry = Arc::new(registry);

    let definition = WorkflowDefinition {
        nodes: vec![
            input_node(),
            WorkflowNode::new("producer", NodeType::Generic("test.counting".to_string())),
            WorkflowNode::new("consumer_a", NodeType::Generic("debug.log".to_string())),
            WorkflowNode::new("consumer_b", NodeType::Generic("debug.log".to_string())),
            WorkflowNode::new("join", NodeType::Coalesce),
            WorkflowNode::new("output", NodeType::Output),
        ],
        links: vec![
            Link::new("input", "producer"),
            Link::new("producer", "consumer_a"),
            Link::new("producer", "consumer_b"),
            Link::new("consumer_a", "join"),
            Link::new("consumer_b", "join"),
            Link::new("join", "output"),
        ],
        test_inputs: vec![],
    };

    let mut initial = HashMap::new();
    initial.insert("value".to_string(), Value::Number(1.0));

    let outputs = scheduler(registry)
        .run(definition, initial, RunOptions::default())
        .await
        .expect("a diamond-shaped fan-out should still complete");

    assert!(outputs.contains_key("output"));
    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "two concurrent consumers racing for the same producer must still only invoke it once"
    );
}

#[tokio::test]
async fn a_pause_takes_priority_over_a_concurrent_failure_and_leaves_unrelated_work_completed() {
    let mut registry = NodeRegistry::new();
    flownodes::register_all(&mut registry);
    registry.register(Arc::new(FailingNodeFactory));
    let registry = Arc::new(registry);

    let gate = WorkflowNode::new("gate", NodeType::HumanIntervention).with_config(
        "blocked_nodes",
        Value::Array(vec![Value::String("blocked".to_string())]),
    );

    let definition = WorkflowDefinition {
        nodes: vec![
            input_node(),
            gate,
            WorkflowNode::new("blocked", NodeType::Output),
            WorkflowNode::new("unrelated", NodeType::Output),
            WorkflowNode::new("boom", NodeType::Generic("test.failing".to_string())),
        ],
        links: vec![
            Link::new("input", "gate"),
            Link::new("gate", "blocked"),
            Link::new("input", "unrelated"),
            Link::new("input", "boom"),
        ],
        test_inputs: vec![],
    };

    let mut initial = HashMap::new();
    initial.insert("payload".to_string(), Value::String("hi".to_string()));

    let recorder = Arc::new(InMemoryTaskRecorder::new());
    let scheduler = Scheduler::new(
        registry,
        recorder.clone(),
        Arc::new(InMemoryRunStore::new()),
        Arc::new(EventBus::new(64)),
    );

    let run = scheduler.run(definition, initial, RunOptions::default()).await;

    match run {
        Err(RunError::Paused { node_id, outputs }) => {
            assert_eq!(node_id, "gate");
            assert!(
                outputs.contains_key("unrelated"),
                "a branch that never touched the paused node should still complete"
            );
        }
        other => panic!("a pause must win over a concurrent failure, got {other:?}"),
    }

    let blocked_records = recorder.records_for_node("blocked").await;
    assert_eq!(blocked_records.len(), 1);
    assert_eq!(blocked_records[0].status, TaskStatus::Pending);
    assert!(
        blocked_records[0].is_downstream_of_pause,
        "the node gated behind the pause must be flagged as such, not just left pending"
    );

    let boom_records = recorder.records_for_node("boom").await;
    assert_eq!(boom_records.len(), 1);
    assert_eq!(boom_records[0].status, TaskStatus::Failed);
    assert!(
        !boom_records[0].is_downstream_of_pause,
        "a node that failed on its own merits is not downstream of the pause"
    );

    let unrelated_records = recorder.records_for_node("unrelated").await;
    assert_eq!(unrelated_records.len(), 1);
    assert_eq!(unrelated_records[0].status, TaskStatus::Completed);
}

#[tokio::test]
async fn a_node_downstream_of_a_pause_that_fails_on_its_own_is_downgraded_not_failed() {
    // "boom" is directly downstream of the paused gate but is not named in
    // its `blocked_nodes`, so it is not pause-gated: it receives the gate's
    // (non-null) human-intervention output as input and actually runs, then
    // fails on its own logic. Even so, because it is transitively downstream
    // of the pause, the driver sweep must downgrade it to `Pending` /
    // `is_downstream_of_pause`, not leave it `Failed`.
    let mut registry = NodeRegistry::new();
    flownodes::register_all(&mut registry);
    registry.register(Arc::new(FailingNodeFactory));
    let registry = Arc::new(registry);

    let gate = WorkflowNode::new("gate", NodeType::HumanIntervention).with_config(
        "blocked_nodes",
        Value::Array(vec![Value::String("blocked_output".to_string())]),
    );

    let definition = WorkflowDefinition {
        nodes: vec![
            input_node(),
            gate,
            WorkflowNode::new("blocked_output", NodeType::Output),
            WorkflowNode::new("boom", NodeType::Generic("test.failing".to_string())),
        ],
        links: vec![
            Link::new("input", "gate"),
            Link::new("gate", "blocked_output"),
            Link::new("gate", "boom"),
        ],
        test_inputs: vec![],
    };

    let mut initial = HashMap::new();
    initial.insert("payload".to_string(), Value::String("hi".to_string()));

    let recorder = Arc::new(InMemoryTaskRecorder::new());
    let scheduler = Scheduler::new(
        registry,
        recorder.clone(),
        Arc::new(InMemoryRunStore::new()),
        Arc::new(EventBus::new(64)),
    );

    let run = scheduler.run(definition, initial, RunOptions::default()).await;

    match run {
        Err(RunError::Paused { node_id, .. }) => assert_eq!(node_id, "gate"),
        other => panic!("a pause downstream of an unrelated failure must still be reported as a pause, got {other:?}"),
    }

    let boom_records = recorder.records_for_node("boom").await;
    assert_eq!(boom_records.len(), 1);
    assert_eq!(
        boom_records[0].status,
        TaskStatus::Pending,
        "a node downstream of the pause must be downgraded even if it actually ran and failed"
    );
    assert!(
        boom_records[0].is_downstream_of_pause,
        "boom is reachable only through the paused gate, so it must be flagged downstream of pause"
    );
}
