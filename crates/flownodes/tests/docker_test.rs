//! Exercises `DockerNode` against a real local Docker daemon. Ignored by
//! default since it needs `docker` on PATH and network access to pull
//! `alpine`/`python` images.

use flowcore::{
    EventBus, ExecutionContext, Node, RunId, RunType, SubworkflowRunner, Value, WorkflowDefinition,
};
use flownodes::DockerNode;
use std::collections::HashMap;
use std::sync::Arc;

struct NoSubworkflows;

#[async_trait::async_trait]
impl SubworkflowRunner for NoSubworkflows {
    async fn run_subworkflow(
        &self,
        _workflow: Arc<WorkflowDefinition>,
        _inputs: HashMap<String, Value>,
        _parent_run_id: RunId,
    ) -> Result<HashMap<String, Value>, flowcore::NodeError> {
        unimplemented!("docker node tests do not exercise subworkflows")
    }
}

fn test_context() -> ExecutionContext {
    let bus = EventBus::new(16);
    let run_id = RunId::new_v4();
    ExecutionContext::new(
        run_id,
        Arc::new(WorkflowDefinition::new()),
        Arc::new(flowruntime::InMemoryRunStore::new()),
        bus.create_emitter(uuid::Uuid::new_v4(), "docker_under_test".to_string()),
        Arc::new(NoSubworkflows),
    )
    .with_parent(run_id, RunType::Interactive)
}

fn config(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[tokio::test]
#[ignore = "requires a local docker daemon"]
async fn echoes_stdout_and_reports_success() {
    let node = DockerNode::new(&config(&[
        ("image", Value::String("alpine:latest".to_string())),
        ("command", Value::String("echo Hello from Docker".to_string())),
        ("stdin_mode", Value::String("none".to_string())),
        ("output_mode", Value::String("text".to_string())),
    ]))
    .unwrap();

    let ctx = test_context();
    let output = node.call(HashMap::new(), &ctx).await.expect("docker run should succeed");
    let values = output.values();

    let stdout = values.get("stdout").and_then(Value::as_str).unwrap();
    assert!(stdout.contains("Hello from Docker"));
    assert_eq!(values.get("exit_code").and_then(Value::as_f64), Some(0.0));
    assert_eq!(values.get("success").and_then(Value::as_bool), Some(true));
}

#[tokio::test]
#[ignore = "requires a local docker daemon"]
async fn reports_nonzero_exit_without_failing_the_call() {
    let node = DockerNode::new(&config(&[
        ("image", Value::String("alpine:latest".to_string())),
        ("command", Value::String("sh -c \"exit 42\"".to_string())),
        ("stdin_mode", Value::String("none".to_string())),
    ]))
    .unwrap();

    let ctx = test_context();
    let output = node.call(HashMap::new(), &ctx).await.expect("a non-zero exit is not a node failure");
    let values = output.values();

    assert_eq!(values.get("exit_code").and_then(Value::as_f64), Some(42.0));
    assert_eq!(values.get("success").and_then(Value::as_bool), Some(false));
}

#[tokio::test]
#[ignore = "requires a local docker daemon"]
async fn pipes_text_stdin_to_cat() {
    let node = DockerNode::new(&config(&[
        ("image", Value::String("alpine:latest".to_string())),
        ("command", Value::String("cat".to_string())),
        ("stdin_mode", Value::String("text".to_string())),
        ("output_mode", Value::String("text".to_string())),
    ]))
    .unwrap();

    let mut input = HashMap::new();
    input.insert("data".to_string(), Value::String("Hello, Docker!".to_string()));

    let ctx = test_context();
    let output = node.call(input, &ctx).await.expect("docker run should succeed");
    let values = output.values();

    assert_eq!(
        values.get("stdout").and_then(Value::as_str).map(str::trim),
        Some("Hello, Docker!")
    );
}

#[test]
fn rejects_missing_image_config() {
    let result = DockerNode::new(&HashMap::new());
    assert!(result.is_err());
}
