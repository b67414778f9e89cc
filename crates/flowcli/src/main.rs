// crates/flowcli/src/main.rs

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use flowcore::{ExecutionEvent, NodeEvent, Value, WorkflowDefinition, WorkflowNode};
use flowruntime::{FlowRuntime, RunError, RuntimeConfig};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Flow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow definition to completion, to a pause, or to failure
    Run {
        /// Path to a workflow definition JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input data as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Restrict the run to these node ids (comma-separated); useful for
        /// re-running just a subgraph against precomputed upstream outputs
        #[arg(long, value_delimiter = ',')]
        node_ids: Option<Vec<String>>,

        /// Path to a JSON file of `{node_id: output}` to seed as
        /// precomputed, so those nodes are not re-executed
        #[arg(long)]
        precomputed: Option<PathBuf>,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Resume a workflow that previously paused at a human-intervention node
    Resume {
        #[arg(short, long)]
        file: PathBuf,

        /// Path to the JSON `{node_id: output}` map the paused run returned
        #[arg(long)]
        paused_outputs: PathBuf,

        /// Original input data, identical to the paused run's
        #[arg(short, long)]
        input: Option<String>,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow file without executing it
    Validate {
        file: PathBuf,
    },

    /// List node types registered with the standard node library
    Nodes,

    /// Write an example workflow definition to a file
    Init {
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

fn json_to_value(json: serde_json::Value) -> Value {
    Value::from_json(json)
}

fn parse_inputs(input: Option<String>) -> Result<HashMap<String, Value>> {
    let Some(input_str) = input else {
        return Ok(HashMap::new());
    };
    let json: serde_json::Value = serde_json::from_str(&input_str)?;
    match json {
        serde_json::Value::Object(obj) => Ok(obj.into_iter().map(|(k, v)| (k, json_to_value(v))).collect()),
        _ => Err(anyhow!("input must be a JSON object")),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

fn load_workflow(file: &PathBuf) -> Result<WorkflowDefinition> {
    let raw = std::fs::read_to_string(file)?;
    let definition: WorkflowDefinition = serde_json::from_str(&raw)?;
    Ok(flowruntime::load(definition)?)
}

fn build_runtime() -> FlowRuntime {
    let mut registry = flowruntime::NodeRegistry::new();
    flownodes::register_all(&mut registry);
    FlowRuntime::with_registry(Arc::new(registry), RuntimeConfig::default())
}

fn spawn_event_printer(runtime: &FlowRuntime) -> tokio::task::JoinHandle<()> {
    let mut events = runtime.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::WorkflowStarted { .. } => {
                    println!("workflow started");
                }
                ExecutionEvent::WorkflowCompleted { success, duration_ms, .. } => {
                    if success {
                        println!("workflow completed in {duration_ms}ms");
                    } else {
                        println!("workflow failed after {duration_ms}ms");
                    }
                }
                ExecutionEvent::NodeStarted { node_id, node_type, .. } => {
                    println!("  starting {node_id} ({node_type})");
                }
                ExecutionEvent::NodeCompleted { node_id, duration_ms, .. } => {
                    println!("  {node_id} completed in {duration_ms}ms");
                }
                ExecutionEvent::NodeFailed { node_id, error, .. } => {
                    println!("  {node_id} failed: {error}");
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => println!("    [{node_id}] {message}"),
                    NodeEvent::Warning { message } => println!("    [{node_id}] warning: {message}"),
                    NodeEvent::Progress { percent, message } => match message {
                        Some(msg) => println!("    [{node_id}] {percent}% - {msg}"),
                        None => println!("    [{node_id}] {percent}%"),
                    },
                    NodeEvent::Data { .. } => {}
                },
            }
        }
    })
}

fn print_outputs(outputs: &HashMap<String, serde_json::Value>) {
    if outputs.is_empty() {
        return;
    }
    println!();
    println!("outputs:");
    for (node_id, value) in outputs {
        println!("  {node_id}: {value}");
    }
}

async fn run_workflow(
    file: PathBuf,
    input: Option<String>,
    node_ids: Option<Vec<String>>,
    precomputed: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    init_logging(verbose);

    let definition = load_workflow(&file)?;
    println!("loaded workflow: {} nodes, {} links", definition.nodes.len(), definition.links.len());

    let inputs = parse_inputs(input)?;
    let node_ids: Option<HashSet<String>> = node_ids.map(|ids| ids.into_iter().collect());
    let precomputed_outputs = match precomputed {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw)?
        }
        None => HashMap::new(),
    };

    let runtime = build_runtime();
    let event_task = spawn_event_printer(&runtime);

    let options = flowruntime::RunOptions {
        node_ids,
        precomputed_outputs,
        ..Default::default()
    };

    let result = runtime.scheduler().run(definition, inputs, options).await;

    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    event_task.abort();

    match result {
        Ok(outputs) => {
            print_outputs(&outputs);
            Ok(())
        }
        Err(RunError::Paused { node_id, outputs }) => {
            println!();
            println!("run paused at node '{node_id}'");
            println!("resume with: flow resume --file {} --paused-outputs <path to the outputs below>", file.display());
            print_outputs(&outputs);
            let paused_path = file.with_extension("paused.json");
            std::fs::write(&paused_path, serde_json::to_string_pretty(&outputs)?)?;
            println!("wrote paused outputs to {}", paused_path.display());
            Ok(())
        }
        Err(other) => Err(other.into()),
    }
}

async fn resume_workflow(file: PathBuf, paused_outputs: PathBuf, input: Option<String>, verbose: bool) -> Result<()> {
    init_logging(verbose);

    let definition = load_workflow(&file)?;
    let inputs = parse_inputs(input)?;
    let raw_outputs = std::fs::read_to_string(&paused_outputs)?;
    let outputs: HashMap<String, serde_json::Value> = serde_json::from_str(&raw_outputs)?;

    let runtime = build_runtime();
    let event_task = spawn_event_printer(&runtime);

    let result = runtime.resume(&definition, outputs, inputs, None).await;

    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    event_task.abort();

    match result {
        Ok(outputs) => {
            print_outputs(&outputs);
            Ok(())
        }
        Err(RunError::Paused { node_id, outputs }) => {
            println!("run paused again at node '{node_id}'");
            print_outputs(&outputs);
            Ok(())
        }
        Err(other) => Err(other.into()),
    }
}

fn validate_workflow(file: PathBuf) -> Result<()> {
    let definition = load_workflow(&file)?;
    println!("workflow is valid");
    println!("  nodes: {}", definition.nodes.len());
    println!("  links: {}", definition.links.len());
    println!("  input nodes: {}", definition.input_nodes().count());
    Ok(())
}

fn list_nodes() {
    let mut registry = flowruntime::NodeRegistry::new();
    flownodes::register_all(&mut registry);

    let mut node_types = registry.list_node_types();
    node_types.sort();

    for node_type in node_types {
        match registry.get_metadata(&node_type) {
            Some(metadata) => {
                println!("{node_type} ({})", metadata.category);
                if !metadata.description.is_empty() {
                    println!("  {}", metadata.description);
                }
            }
            None => println!("{node_type}"),
        }
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let definition = WorkflowDefinition {
        nodes: vec![
            WorkflowNode::new("fetch", flowcore::NodeType::Input),
            WorkflowNode::new("request", flowcore::NodeType::Generic("http.request".to_string()))
                .with_config("method", "GET"),
            WorkflowNode::new("log", flowcore::NodeType::Generic("debug.log".to_string())),
            WorkflowNode::new("result", flowcore::NodeType::Output),
        ],
        links: vec![
            flowcore::Link::new("fetch", "request"),
            flowcore::Link::new("request", "log"),
            flowcore::Link::new("log", "result"),
        ],
        test_inputs: vec![],
    };

    let json = serde_json::to_string_pretty(&definition)?;
    std::fs::write(&output, json)?;

    println!("wrote example workflow to {}", output.display());
    println!();
    println!("run it with:");
    println!("  flow run --file {} --input '{{\"url\": \"https://api.github.com/zen\"}}'", output.display());

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, input, node_ids, precomputed, verbose } => {
            run_workflow(file, input, node_ids, precomputed, verbose).await
        }
        Commands::Resume { file, paused_outputs, input, verbose } => {
            resume_workflow(file, paused_outputs, input, verbose).await
        }
        Commands::Validate { file } => validate_workflow(file),
        Commands::Nodes => {
            list_nodes();
            Ok(())
        }
        Commands::Init { output } => create_example_workflow(output),
    }
}
