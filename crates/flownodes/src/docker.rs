//! Runs a workflow step inside a Docker container, piping the assembled
//! input to the container's stdin and its stdout/stderr back as outputs.

use async_trait::async_trait;
use flowcore::{ExecutionContext, Node, NodeError, NodeOutcome, NodeOutput, StandardOutput, Value};
use flowruntime::{NodeFactory, NodeMetadata, PortDefinition};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

#[derive(Debug, Clone)]
struct DockerConfig {
    image: String,
    command: Option<Vec<String>>,
    entrypoint: Option<Vec<String>>,
    env: HashMap<String, String>,
    volumes: Vec<VolumeMount>,
    working_dir: Option<String>,
    user: Option<String>,
    network: Option<String>,
    cpu_limit: Option<String>,
    memory_limit: Option<String>,
    stdin_mode: StdinMode,
    output_mode: OutputMode,
    auto_pull: bool,
    remove: bool,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
struct VolumeMount {
    host_path: String,
    container_path: String,
    read_only: bool,
}

#[derive(Debug, Clone)]
enum StdinMode {
    None,
    Raw,
    Json,
    Text,
}

#[derive(Debug, Clone)]
enum OutputMode {
    Auto,
    Json,
    Text,
}

pub struct DockerNode {
    config: DockerConfig,
}

impl DockerNode {
    pub fn new(raw: &HashMap<String, Value>) -> Result<Self, NodeError> {
        Ok(Self {
            config: Self::parse_config(raw)?,
        })
    }

    fn parse_config(raw: &HashMap<String, Value>) -> Result<DockerConfig, NodeError> {
        let image = raw
            .get("image")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Configuration("image must be a string".to_string()))?
            .to_string();

        let command = raw.get("command").and_then(|v| match v {
            Value::String(s) => Some(split_shell_words(s)),
            Value::Array(arr) => Some(arr.iter().filter_map(|v| v.as_str().map(String::from)).collect()),
            _ => None,
        });

        let entrypoint = raw.get("entrypoint").and_then(|v| match v {
            Value::String(s) => Some(vec![s.clone()]),
            Value::Array(arr) => Some(arr.iter().filter_map(|v| v.as_str().map(String::from)).collect()),
            _ => None,
        });

        let mut env = HashMap::new();
        if let Some(Value::Object(env_obj)) = raw.get("env") {
            for (key, value) in env_obj {
                if let Some(val_str) = value.as_str() {
                    env.insert(key.clone(), val_str.to_string());
                } else if let Value::Json(json_val) = value {
                    env.insert(key.clone(), json_val.to_string());
                }
            }
        }

        let mut volumes = Vec::new();
        if let Some(Value::Array(vols)) = raw.get("volumes") {
            for vol in vols {
                if let Some(vol_str) = vol.as_str() {
                    if let Some(mount) = parse_volume(vol_str) {
                        volumes.push(mount);
                    }
                }
            }
        }

        let working_dir = raw.get("workdir").and_then(Value::as_str).map(String::from);
        let user = raw.get("user").and_then(Value::as_str).map(String::from);
        let network = raw.get("network").and_then(Value::as_str).map(String::from);
        let cpu_limit = raw.get("cpu_limit").and_then(Value::as_str).map(String::from);
        let memory_limit = raw.get("memory_limit").and_then(Value::as_str).map(String::from);

        let stdin_mode = raw
            .get("stdin_mode")
            .and_then(Value::as_str)
            .and_then(|s| match s {
                "none" => Some(StdinMode::None),
                "raw" => Some(StdinMode::Raw),
                "json" => Some(StdinMode::Json),
                "text" => Some(StdinMode::Text),
                _ => None,
            })
            .unwrap_or(StdinMode::Json);

        let output_mode = raw
            .get("output_mode")
            .and_then(Value::as_str)
            .and_then(|s| match s {
                "auto" => Some(OutputMode::Auto),
                "json" => Some(OutputMode::Json),
                "text" => Some(OutputMode::Text),
                _ => None,
            })
            .unwrap_or(OutputMode::Auto);

        let auto_pull = raw.get("auto_pull").and_then(Value::as_bool).unwrap_or(true);
        let remove = raw.get("remove").and_then(Value::as_bool).unwrap_or(true);
        let timeout_seconds = raw.get("timeout").and_then(Value::as_f64).map(|f| f as u64);

        Ok(DockerConfig {
            image,
            command,
            entrypoint,
            env,
            volumes,
            working_dir,
            user,
            network,
            cpu_limit,
            memory_limit,
            stdin_mode,
            output_mode,
            auto_pull,
            remove,
            timeout_seconds,
        })
    }

    async fn pull_image_if_needed(image: &str, ctx: &ExecutionContext) -> Result<(), NodeError> {
        ctx.events.info(format!("checking for image: {image}"));

        let check_result = Command::new("docker")
            .args(["image", "inspect", image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("failed to check image: {e}")))?;

        if !check_result.success() {
            ctx.events.info(format!("pulling image: {image}"));
            let pull_result = Command::new("docker")
                .args(["pull", image])
                .status()
                .await
                .map_err(|e| NodeError::ExecutionFailed(format!("failed to pull image: {e}")))?;
            if !pull_result.success() {
                return Err(NodeError::ExecutionFailed(format!("failed to pull image: {image}")));
            }
            ctx.events.info("image pulled successfully");
        }

        Ok(())
    }

    fn prepare_stdin_data(input: &HashMap<String, Value>, stdin_mode: &StdinMode) -> Result<Vec<u8>, NodeError> {
        match stdin_mode {
            StdinMode::None => Ok(Vec::new()),
            StdinMode::Raw => input
                .get("data")
                .and_then(|v| match v {
                    Value::String(s) => Some(s.as_bytes().to_vec()),
                    Value::Bytes(b) => Some(b.clone()),
                    _ => None,
                })
                .ok_or_else(|| NodeError::MissingInput("data".to_string())),
            StdinMode::Json => {
                let json = flowcore::serialize_value_map(input);
                serde_json::to_vec(&json)
                    .map_err(|e| NodeError::ExecutionFailed(format!("failed to serialize JSON stdin: {e}")))
            }
            StdinMode::Text => input
                .get("data")
                .and_then(Value::as_str)
                .map(|s| s.as_bytes().to_vec())
                .ok_or_else(|| NodeError::MissingInput("data".to_string())),
        }
    }
}

fn parse_volume(volume_str: &str) -> Option<VolumeMount> {
    let parts: Vec<&str> = volume_str.split(':').collect();
    match parts.len() {
        2 => Some(VolumeMount {
            host_path: parts[0].to_string(),
            container_path: parts[1].to_string(),
            read_only: false,
        }),
        3 => Some(VolumeMount {
            host_path: parts[0].to_string(),
            container_path: parts[1].to_string(),
            read_only: parts[2] == "ro",
        }),
        _ => None,
    }
}

fn split_shell_words(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escape = false;

    for c in s.chars() {
        if escape {
            current.push(c);
            escape = false;
        } else if c == '\\' {
            escape = true;
        } else if c == '"' {
            in_quotes = !in_quotes;
        } else if c.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[async_trait]
impl Node for DockerNode {
    fn node_type(&self) -> &str {
        "docker.run"
    }

    async fn call(
        &self,
        input: HashMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutput, NodeOutcome> {
        let config = &self.config;
        ctx.events.info(format!("running docker image: {}", config.image));

        if config.auto_pull {
            Self::pull_image_if_needed(&config.image, ctx)
                .await
                .map_err(NodeOutcome::Failure)?;
        }

        let mut cmd = Command::new("docker");
        cmd.arg("run");

        if config.remove {
            cmd.arg("--rm");
        }
        cmd.arg("-i");

        for (key, value) in &config.env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }

        for volume in &config.volumes {
            let mount_str = if volume.read_only {
                format!("{}:{}:ro", volume.host_path, volume.container_path)
            } else {
                format!("{}:{}", volume.host_path, volume.container_path)
            };
            ctx.events.info(format!("volume: {mount_str}"));
            cmd.arg("-v").arg(mount_str);
        }

        if let Some(ref workdir) = config.working_dir {
            cmd.arg("-w").arg(workdir);
        }
        if let Some(ref user) = config.user {
            cmd.arg("-u").arg(user);
        }
        if let Some(ref network) = config.network {
            cmd.arg("--network").arg(network);
        }
        if let Some(ref cpu_limit) = config.cpu_limit {
            cmd.arg("--cpus").arg(cpu_limit);
        }
        if let Some(ref memory_limit) = config.memory_limit {
            cmd.arg("--memory").arg(memory_limit);
        }
        if let Some(ref entrypoint) = config.entrypoint {
            if !entrypoint.is_empty() {
                cmd.arg("--entrypoint").arg(&entrypoint[0]);
            }
        }

        cmd.arg(&config.image);
        if let Some(ref command) = config.command {
            for part in command {
                cmd.arg(part);
            }
        }

        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

        ctx.events.info("starting container");
        let mut child = cmd
            .spawn()
            .map_err(|e| NodeOutcome::Failure(NodeError::ExecutionFailed(format!("failed to spawn docker: {e}"))))?;

        let input_data = Self::prepare_stdin_data(&input, &config.stdin_mode).map_err(NodeOutcome::Failure)?;
        if !input_data.is_empty() {
            ctx.events.info(format!("sending {} bytes to stdin", input_data.len()));
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(&input_data)
                    .await
                    .map_err(|e| NodeOutcome::Failure(NodeError::ExecutionFailed(format!("failed to write stdin: {e}"))))?;
                drop(stdin);
            }
        }

        let mut stdout_opt = child.stdout.take();
        let mut stderr_opt = child.stderr.take();

        let stdout_future = async move {
            let mut data = Vec::new();
            if let Some(ref mut stdout) = stdout_opt {
                let _ = stdout.read_to_end(&mut data).await;
            }
            data
        };
        let stderr_future = async move {
            let mut data = Vec::new();
            if let Some(ref mut stderr) = stderr_opt {
                let _ = stderr.read_to_end(&mut data).await;
            }
            data
        };

        let (status, stdout_data, stderr_data) = if let Some(timeout_secs) = config.timeout_seconds {
            let duration = tokio::time::Duration::from_secs(timeout_secs);
            let result = tokio::time::timeout(duration, async {
                let (stdout, stderr) = tokio::join!(stdout_future, stderr_future);
                let status = child
                    .wait()
                    .await
                    .map_err(|e| NodeError::ExecutionFailed(format!("process wait failed: {e}")))?;
                Ok::<_, NodeError>((status, stdout, stderr))
            })
            .await;

            match result {
                Ok(Ok(data)) => data,
                Ok(Err(e)) => return Err(NodeOutcome::Failure(e)),
                Err(_) => {
                    ctx.events.warn(format!("container timeout after {timeout_secs}s, killing"));
                    let _ = child.kill().await;
                    return Err(NodeOutcome::Failure(NodeError::Timeout { seconds: timeout_secs }));
                }
            }
        } else {
            let (stdout, stderr) = tokio::join!(stdout_future, stderr_future);
            let status = child
                .wait()
                .await
                .map_err(|e| NodeOutcome::Failure(NodeError::ExecutionFailed(format!("failed to wait for process: {e}"))))?;
            (status, stdout, stderr)
        };

        let stdout_str = String::from_utf8_lossy(&stdout_data).to_string();
        let stderr_str = String::from_utf8_lossy(&stderr_data).to_string();

        if !stderr_str.is_empty() {
            for line in stderr_str.lines().take(10) {
                ctx.events.warn(format!("stderr: {line}"));
            }
        }

        let exit_code = status.code().unwrap_or(-1);
        let success = status.success();
        if success {
            ctx.events.info(format!("container completed (exit code: {exit_code})"));
        } else {
            ctx.events.warn(format!("container exited with code: {exit_code}"));
        }

        let output_value = match config.output_mode {
            OutputMode::Auto => match serde_json::from_str::<serde_json::Value>(&stdout_str) {
                Ok(json) => Value::from_json(json),
                Err(_) => Value::String(stdout_str.clone()),
            },
            OutputMode::Json => {
                let json = serde_json::from_str::<serde_json::Value>(&stdout_str)
                    .map_err(|e| NodeOutcome::Failure(NodeError::ExecutionFailed(format!("failed to parse JSON output: {e}"))))?;
                Value::from_json(json)
            }
            OutputMode::Text => Value::String(stdout_str.clone()),
        };

        let mut values = HashMap::new();
        values.insert("output".to_string(), output_value);
        values.insert("stdout".to_string(), Value::String(stdout_str));
        values.insert("stderr".to_string(), Value::String(stderr_str));
        values.insert("exit_code".to_string(), Value::Number(exit_code as f64));
        values.insert("success".to_string(), Value::Bool(success));

        Ok(NodeOutput::Standard(StandardOutput {
            values,
            ..Default::default()
        }))
    }
}

pub struct DockerNodeFactory;

impl NodeFactory for DockerNodeFactory {
    fn create(
        &self,
        _title: &str,
        _node_type: &flowcore::NodeType,
        config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(DockerNode::new(config)?))
    }

    fn node_type(&self) -> &str {
        "docker.run"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Runs a container with the assembled input piped to its stdin".to_string(),
            category: "docker".to_string(),
            inputs: vec![PortDefinition {
                name: "data".to_string(),
                description: "Data to pass to the container (shape depends on stdin_mode)".to_string(),
                required: false,
            }],
            outputs: vec![
                PortDefinition {
                    name: "output".to_string(),
                    description: "Container stdout, parsed according to output_mode".to_string(),
                    required: false,
                },
                PortDefinition {
                    name: "stdout".to_string(),
                    description: "Raw stdout from the container".to_string(),
                    required: false,
                },
                PortDefinition {
                    name: "stderr".to_string(),
                    description: "Raw stderr from the container".to_string(),
                    required: false,
                },
                PortDefinition {
                    name: "exit_code".to_string(),
                    description: "Container exit code".to_string(),
                    required: false,
                },
                PortDefinition {
                    name: "success".to_string(),
                    description: "Whether the container exited with code 0".to_string(),
                    required: false,
                },
            ],
        }
    }
}
