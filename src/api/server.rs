//! API Server Module
//!
//! This module implements a JSON-RPC server over the batch registry.
//! Every registry operation is one RPC method on a single POST endpoint.

use crate::{config::Config, registry::BatchRegistry, RegistryError};
use axum::{extract::State, routing::post, Json, Router};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Standard JSON-RPC error codes
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Registry error codes
pub const INVALID_BATCH_ID: i32 = -32000;
pub const BATCH_NOT_FOUND: i32 = -32001;
pub const LOG_CORRUPT: i32 = -32002;
pub const UNAUTHORIZED: i32 = -32003;

const DEFAULT_EVENT_PAGE: usize = 100;

/// Shared application state that is accessible across all request handlers
#[derive(Clone)]
pub struct AppState {
    registry: Arc<BatchRegistry>,
}

/// The main API server struct
pub struct Server {
    config: Config,
    state: AppState,
}

impl Server {
    /// Creates a new API server over an opened registry
    pub fn new(config: Config, registry: Arc<BatchRegistry>) -> Self {
        Self {
            config,
            state: AppState { registry },
        }
    }

    /// Binds to the configured address and serves requests until Ctrl-C
    pub async fn start(self) -> anyhow::Result<()> {
        let app = router(self.state.registry.clone());

        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);
        info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

/// Router with the JSON-RPC endpoint at "/"
pub fn router(registry: Arc<BatchRegistry>) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .with_state(AppState { registry })
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// JSON-RPC 2.0 request structure
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Value,
}

/// JSON-RPC 2.0 response structure
///
/// Either `result` or `error` will be populated, but not both.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Value,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<RegistryError> for JsonRpcError {
    fn from(e: RegistryError) -> Self {
        let code = match &e {
            RegistryError::InvalidBatchId { .. } => INVALID_BATCH_ID,
            RegistryError::NotFound(_) => BATCH_NOT_FOUND,
            RegistryError::Corrupt(_) => LOG_CORRUPT,
            RegistryError::Unauthorized(_) => UNAUTHORIZED,
            RegistryError::Storage(_)
            | RegistryError::Serialization(_)
            | RegistryError::OutOfRange(_)
            | RegistryError::Internal(_) => {
                error!("Registry failure: {}", e);
                INTERNAL_ERROR
            }
        };
        Self::new(code, e.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBatchParams {
    crop_type: String,
    origin_farm: String,
    harvest_date: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferOwnershipParams {
    batch_id: u64,
    new_owner: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateStatusParams {
    batch_id: u64,
    new_status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchIdParams {
    batch_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsParams {
    #[serde(default = "first_sequence")]
    from_sequence: u64,
    #[serde(default = "default_event_page")]
    limit: usize,
}

fn first_sequence() -> u64 {
    1
}

fn default_event_page() -> usize {
    DEFAULT_EVENT_PAGE
}

/// Main RPC request handler
///
/// Routes the request to the registry operation named by `method`.
async fn handle_rpc(
    State(state): State<AppState>,
    Json(request): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    info!("Received RPC request: {}", request.method);

    let id = request.id.clone();
    match dispatch(&state, request).await {
        Ok(result) => Json(JsonRpcResponse::success(id, result)),
        Err(e) => {
            warn!(code = e.code, "RPC request failed: {}", e.message);
            Json(JsonRpcResponse::failure(id, e))
        }
    }
}

async fn dispatch(state: &AppState, request: JsonRpcRequest) -> Result<Value, JsonRpcError> {
    if request.jsonrpc != "2.0" {
        return Err(JsonRpcError::new(INVALID_REQUEST, "Invalid Request: jsonrpc must be \"2.0\""));
    }

    let registry = &state.registry;
    match request.method.as_str() {
        "registerBatch" => {
            let p: RegisterBatchParams = parse_params(request.params)?;
            let batch_id = registry
                .register_batch(p.crop_type, p.origin_farm, p.harvest_date)
                .await?;
            Ok(json!({ "batchId": batch_id }))
        }
        "transferOwnership" => {
            let p: TransferOwnershipParams = parse_params(request.params)?;
            registry.transfer_ownership(p.batch_id, p.new_owner).await?;
            Ok(Value::Bool(true))
        }
        "updateStatus" => {
            let p: UpdateStatusParams = parse_params(request.params)?;
            registry.update_status(p.batch_id, p.new_status).await?;
            Ok(Value::Bool(true))
        }
        "getBatchDetails" => {
            let p: BatchIdParams = parse_params(request.params)?;
            to_result(&registry.get_batch_details(p.batch_id).await?)
        }
        "getBatchHistory" => {
            let p: BatchIdParams = parse_params(request.params)?;
            to_result(&registry.get_batch_history(p.batch_id).await?)
        }
        "getEvents" => {
            let p: EventsParams = parse_params(request.params)?;
            to_result(&registry.events(p.from_sequence, p.limit).await)
        }
        "batchCount" => Ok(json!(registry.batch_count().await)),
        "auditLog" => to_result(&registry.audit().await?),
        _ => Err(JsonRpcError::new(METHOD_NOT_FOUND, "Method not found")),
    }
}

/// Decode method params; absent params decode as an empty object
fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, JsonRpcError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {}", e)))
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
}
