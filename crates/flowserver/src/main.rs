use actix_cors::Cors;
use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder, Result as ActixResult};
use actix_ws::Message;
use flowcore::{RunStore, Value, WorkflowDefinition};
use flownodes::ResumeRegistry;
use flowruntime::{FlowRuntime, RunError, RuntimeConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

/// Application state shared across handlers.
///
/// Paused-run outputs are kept separately from `FlowRuntime`'s own
/// registered-workflow map: the scheduler itself is stateless between runs,
/// so the partial outputs a paused run returned have to be held here until
/// a resume request supplies them back.
struct AppState {
    runtime: Arc<FlowRuntime>,
    resume_registry: Arc<ResumeRegistry>,
    paused: RwLock<HashMap<Uuid, HashMap<String, serde_json::Value>>>,
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    #[serde(default)]
    inputs: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ResumeRequest {
    /// Key the paused `HumanInterventionNode` was registered under (its
    /// workflow node `title`).
    resume_key: String,
    #[serde(default)]
    payload: HashMap<String, serde_json::Value>,
    #[serde(default)]
    inputs: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct WorkflowResponse {
    id: Uuid,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
enum ExecutionResponse {
    #[serde(rename = "completed")]
    Completed { outputs: HashMap<String, serde_json::Value> },
    #[serde(rename = "paused")]
    Paused { node_id: String, outputs: HashMap<String, serde_json::Value> },
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn to_value_map(inputs: HashMap<String, serde_json::Value>) -> HashMap<String, Value> {
    inputs.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect()
}

fn run_result_response(result: Result<HashMap<String, serde_json::Value>, RunError>) -> HttpResponse {
    match result {
        Ok(outputs) => HttpResponse::Ok().json(ExecutionResponse::Completed { outputs }),
        Err(RunError::Paused { node_id, outputs }) => {
            HttpResponse::Ok().json(ExecutionResponse::Paused { node_id, outputs })
        }
        Err(other) => HttpResponse::UnprocessableEntity().json(ErrorResponse { error: other.to_string() }),
    }
}

#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "flowengine",
    }))
}

#[get("/api/workflows")]
async fn list_workflows(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let workflows = data.runtime.list_workflows().await;
    let list: Vec<_> = workflows
        .iter()
        .map(|(id, def)| {
            serde_json::json!({
                "id": id,
                "nodes": def.nodes.len(),
                "links": def.links.len(),
            })
        })
        .collect();
    Ok(HttpResponse::Ok().json(list))
}

#[post("/api/workflows")]
async fn create_workflow(
    data: web::Data<AppState>,
    workflow: web::Json<WorkflowDefinition>,
) -> ActixResult<impl Responder> {
    let workflow = match flowruntime::load(workflow.into_inner()) {
        Ok(w) => w,
        Err(e) => return Ok(HttpResponse::BadRequest().json(ErrorResponse { error: e.to_string() })),
    };

    let workflow_id = Uuid::new_v4();
    info!("registering workflow {workflow_id} ({} nodes)", workflow.nodes.len());
    data.runtime.register_workflow(workflow_id, workflow).await;

    Ok(HttpResponse::Created().json(WorkflowResponse {
        id: workflow_id,
        message: "workflow registered".to_string(),
    }))
}

#[get("/api/workflows/{id}")]
async fn get_workflow(data: web::Data<AppState>, path: web::Path<Uuid>) -> ActixResult<impl Responder> {
    let workflow_id = path.into_inner();
    match data.runtime.get_workflow(workflow_id).await {
        Some(workflow) => Ok(HttpResponse::Ok().json(workflow)),
        None => Ok(HttpResponse::NotFound().json(ErrorResponse {
            error: format!("workflow {workflow_id} not found"),
        })),
    }
}

#[actix_web::delete("/api/workflows/{id}")]
async fn delete_workflow(data: web::Data<AppState>, path: web::Path<Uuid>) -> ActixResult<impl Responder> {
    let workflow_id = path.into_inner();
    match data.runtime.remove_workflow(workflow_id).await {
        Some(_) => {
            data.paused.write().await.remove(&workflow_id);
            Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "workflow deleted" })))
        }
        None => Ok(HttpResponse::NotFound().json(ErrorResponse {
            error: format!("workflow {workflow_id} not found"),
        })),
    }
}

#[post("/api/workflows/{id}/execute")]
async fn execute_workflow(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<ExecuteRequest>,
) -> ActixResult<impl Responder> {
    let workflow_id = path.into_inner();
    let inputs = to_value_map(req.into_inner().inputs);

    info!("executing workflow {workflow_id}");

    let result = data.runtime.execute_workflow(workflow_id, inputs).await;

    if let Err(e) = &result {
        error!("workflow {workflow_id} failed: {e}");
    }
    if let Err(RunError::Paused { outputs, .. }) = &result {
        data.paused.write().await.insert(workflow_id, outputs.clone());
    }

    Ok(run_result_response(result))
}

/// Resume a workflow previously paused at a `HumanInterventionNode`: marks
/// the resume key in the shared `ResumeRegistry` and re-enters the run with
/// the partial outputs recorded at pause time as precomputed.
#[post("/api/workflows/{id}/resume")]
async fn resume_workflow(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<ResumeRequest>,
) -> ActixResult<impl Responder> {
    let workflow_id = path.into_inner();
    let request = req.into_inner();

    let Some(workflow) = data.runtime.get_workflow(workflow_id).await else {
        return Ok(HttpResponse::NotFound().json(ErrorResponse {
            error: format!("workflow {workflow_id} not found"),
        }));
    };
    let Some(paused_outputs) = data.paused.write().await.remove(&workflow_id) else {
        return Ok(HttpResponse::Conflict().json(ErrorResponse {
            error: format!("workflow {workflow_id} is not currently paused"),
        }));
    };

    data.resume_registry.resume(&request.resume_key, to_value_map(request.payload));

    let inputs = to_value_map(request.inputs);
    let result = data.runtime.resume(&workflow, paused_outputs, inputs, None).await;

    if let Err(RunError::Paused { outputs, .. }) = &result {
        data.paused.write().await.insert(workflow_id, outputs.clone());
    }

    Ok(run_result_response(result))
}

#[get("/api/workflows/{id}/runs/{run_id}")]
async fn get_run(data: web::Data<AppState>, path: web::Path<(Uuid, Uuid)>) -> ActixResult<impl Responder> {
    let (_workflow_id, run_id) = path.into_inner();
    match data.runtime.run_store().get_run(run_id).await {
        Ok(Some(record)) => Ok(HttpResponse::Ok().json(record)),
        Ok(None) => Ok(HttpResponse::NotFound().json(ErrorResponse {
            error: format!("run {run_id} not found"),
        })),
        Err(e) => Ok(HttpResponse::InternalServerError().json(ErrorResponse { error: e.to_string() })),
    }
}

/// WebSocket endpoint streaming every `ExecutionEvent` emitted by any run
/// on this server, regardless of which workflow it belongs to.
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("websocket client connected");
    let mut events = data.runtime.subscribe_events();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(_) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("websocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

#[get("/api/nodes")]
async fn list_node_types(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let registry = data.runtime.registry();
    let nodes: Vec<_> = registry
        .list_node_types()
        .iter()
        .map(|node_type| {
            let metadata = registry.get_metadata(node_type);
            serde_json::json!({
                "type": node_type,
                "description": metadata.as_ref().map(|m| m.description.clone()).unwrap_or_default(),
                "category": metadata.as_ref().map(|m| m.category.clone()).unwrap_or_default(),
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(nodes))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    info!("starting flow engine server");

    let mut registry = flowruntime::NodeRegistry::new();
    let resume_registry = flownodes::register_all(&mut registry);

    let runtime = Arc::new(FlowRuntime::with_registry(Arc::new(registry), RuntimeConfig::default()));

    info!("runtime initialized with standard nodes");

    let app_state = web::Data::new(AppState {
        runtime,
        resume_registry,
        paused: RwLock::new(HashMap::new()),
    });

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    info!("server starting on http://{bind_address}");

    HttpServer::new(move || {
        let cors = Cors::default().allow_any_origin().allow_any_method().allow_any_header().max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .service(health_check)
            .service(list_workflows)
            .service(create_workflow)
            .service(get_workflow)
            .service(delete_workflow)
            .service(execute_workflow)
            .service(resume_workflow)
            .service(get_run)
            .service(websocket_events)
            .service(list_node_types)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
