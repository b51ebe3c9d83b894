//! Axum HTTP façade for the tool bridge.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use jobscout_bridge::rpc::{parse_message, DispatchError, Incoming, RpcDispatcher, RpcResponse};
use jobscout_bridge::tools::ToolDescriptor;
use jobscout_bridge::{build_bridge_from_env, SERVER_NAME, SERVER_VERSION};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tokio::net::TcpListener;
use tracing::{info, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "jobscout-web";

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
        }
    }
}

impl WebConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("JOBSCOUT_HOST").unwrap_or(defaults.host),
            port: std::env::var("JOBSCOUT_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
        }
    }
}

/// Monotonic per-process request numbering for log correlation.
#[derive(Debug, Default)]
pub struct RequestCounter(AtomicU64);

impl RequestCounter {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<RpcDispatcher>,
    pub requests: Arc<RequestCounter>,
}

impl AppState {
    pub fn new(dispatcher: Arc<RpcDispatcher>) -> Self {
        Self {
            dispatcher,
            requests: Arc::new(RequestCounter::default()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfo {
    server_name: &'static str,
    version: &'static str,
    tool_count: usize,
    tools: Vec<ToolDescriptor>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/mcp", get(info_handler).post(rpc_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(config: WebConfig, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!(addr = %listener.local_addr()?, "serving MCP over HTTP");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let bridge = build_bridge_from_env().await?;
    let state = AppState::new(Arc::new(RpcDispatcher::new(Arc::new(bridge))));
    serve(WebConfig::from_env(), state).await
}

async fn health_handler() -> Json<JsonValue> {
    Json(json!({"status": "healthy"}))
}

async fn info_handler(State(state): State<Arc<AppState>>) -> Json<ServerInfo> {
    let tools = state.dispatcher.bridge().tools();
    Json(ServerInfo {
        server_name: SERVER_NAME,
        version: SERVER_VERSION,
        tool_count: tools.len(),
        tools,
    })
}

async fn rpc_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request_no = state.requests.next();
    let span = info_span!("mcp_request", request_no);
    handle_rpc(state, body).instrument(span).await
}

async fn handle_rpc(state: Arc<AppState>, body: Bytes) -> Response {
    let raw = match std::str::from_utf8(&body) {
        Ok(raw) => raw,
        Err(err) => {
            return rpc_reply(JsonValue::Null, Err(DispatchError::Parse(err.to_string())));
        }
    };

    let request = match parse_message(raw) {
        Incoming::Request(request) => request,
        Incoming::Invalid { id, error } => {
            warn!(error = %error, "rejecting request body");
            return rpc_reply(id, Err(error));
        }
    };

    if request.is_notification() {
        info!(method = %request.method, "notification received");
        return (StatusCode::OK, Json(json!({}))).into_response();
    }

    info!(method = %request.method, "rpc call");
    let result = state.dispatcher.dispatch(&request).await;
    rpc_reply(request.response_id(), result)
}

fn rpc_reply(id: JsonValue, result: Result<JsonValue, DispatchError>) -> Response {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(err) => StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    };
    if let Err(err) = &result {
        warn!(code = err.code(), error = %err, "rpc error");
    }
    (status, Json(RpcResponse::from_result(id, &result))).into_response()
}
