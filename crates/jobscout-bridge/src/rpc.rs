//! JSON-RPC 2.0 envelopes and the method dispatcher shared by the HTTP and
//! stdio transports.

use std::sync::Arc;

use jobscout_core::ToolCall;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use thiserror::Error;
use tracing::debug;

use crate::tools::{ToolBridge, ToolError};
use crate::{SERVER_NAME, SERVER_VERSION};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const RESOURCE_NOT_FOUND: i64 = -32002;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<JsonValue>,
    pub method: String,
    #[serde(default)]
    pub params: Option<JsonValue>,
}

impl RpcRequest {
    pub fn is_notification(&self) -> bool {
        self.method.starts_with("notifications/")
    }

    pub fn response_id(&self) -> JsonValue {
        self.id.clone().unwrap_or(JsonValue::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: JsonValue, result: JsonValue) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: JsonValue, error: &DispatchError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error.to_rpc_error()),
        }
    }

    pub fn from_result(id: JsonValue, result: &Result<JsonValue, DispatchError>) -> Self {
        match result {
            Ok(value) => Self::success(id, value.clone()),
            Err(err) => Self::failure(id, err),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Server not initialized")]
    NotInitialized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse(_) => PARSE_ERROR,
            Self::InvalidRequest(_) | Self::NotInitialized => INVALID_REQUEST,
            Self::UnknownMethod(_) | Self::UnknownTool(_) => METHOD_NOT_FOUND,
            Self::UnknownResource(_) => RESOURCE_NOT_FOUND,
            Self::InvalidParams(_) => INVALID_PARAMS,
            Self::Internal(_) => INTERNAL_ERROR,
        }
    }

    /// Status for the HTTP transport. Failures inside a well-formed
    /// `tools/call` or `resources/read` stay at 200.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UnknownTool(_) | Self::UnknownResource(_) => 200,
            Self::Internal(_) => 500,
            _ => 400,
        }
    }

    pub fn to_rpc_error(&self) -> RpcError {
        RpcError {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// A decoded line or body: either a request, or an error to send back as-is.
#[derive(Debug)]
pub enum Incoming {
    Request(RpcRequest),
    Invalid { id: JsonValue, error: DispatchError },
}

pub fn parse_message(raw: &str) -> Incoming {
    let value: JsonValue = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            return Incoming::Invalid {
                id: JsonValue::Null,
                error: DispatchError::Parse(err.to_string()),
            }
        }
    };
    if !value.is_object() {
        return Incoming::Invalid {
            id: JsonValue::Null,
            error: DispatchError::Parse("expected a JSON object".to_string()),
        };
    }
    let id = value.get("id").cloned().unwrap_or(JsonValue::Null);
    match serde_json::from_value::<RpcRequest>(value) {
        Ok(request) => Incoming::Request(request),
        Err(err) => Incoming::Invalid {
            id,
            error: DispatchError::InvalidRequest(err.to_string()),
        },
    }
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Map<String, JsonValue>>,
}

#[derive(Debug, Deserialize)]
struct ReadParams {
    uri: String,
}

#[derive(Clone)]
pub struct RpcDispatcher {
    bridge: Arc<ToolBridge>,
}

impl RpcDispatcher {
    pub fn new(bridge: Arc<ToolBridge>) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &ToolBridge {
        &self.bridge
    }

    pub fn initialize_result() -> JsonValue {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}, "resources": {}},
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION}
        })
    }

    pub async fn dispatch(&self, request: &RpcRequest) -> Result<JsonValue, DispatchError> {
        debug!(method = %request.method, "dispatching");
        match request.method.as_str() {
            "initialize" => Ok(Self::initialize_result()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.bridge.tools() })),
            "tools/call" => self.call_tool(request.params.clone()).await,
            "resources/list" => Ok(json!({ "resources": self.bridge.resources() })),
            "resources/read" => self.read_resource(request.params.clone()).await,
            method if request.is_notification() => {
                debug!(method, "notification acknowledged");
                Ok(json!({}))
            }
            other => Err(DispatchError::UnknownMethod(other.to_string())),
        }
    }

    async fn call_tool(&self, params: Option<JsonValue>) -> Result<JsonValue, DispatchError> {
        let params: CallParams = decode_params(params)?;
        let call = ToolCall {
            name: params.name,
            arguments: params.arguments.unwrap_or_default(),
        };
        match self.bridge.call(&call).await {
            Ok(text) => Ok(tool_result(&text, false)),
            Err(ToolError::UnknownTool(name)) => Err(DispatchError::UnknownTool(name)),
            Err(err) if err.is_internal() => Err(DispatchError::Internal(err.to_string())),
            Err(err) => Ok(tool_result(&err.to_string(), true)),
        }
    }

    async fn read_resource(&self, params: Option<JsonValue>) -> Result<JsonValue, DispatchError> {
        let params: ReadParams = decode_params(params)?;
        match self.bridge.read_resource(&params.uri).await {
            Ok(text) => Ok(json!({
                "contents": [{"uri": params.uri, "mimeType": "application/json", "text": text}]
            })),
            Err(ToolError::UnknownResource(uri)) => Err(DispatchError::UnknownResource(uri)),
            Err(err) => Err(DispatchError::Internal(err.to_string())),
        }
    }
}

fn decode_params<T: DeserializeOwned>(params: Option<JsonValue>) -> Result<T, DispatchError> {
    let params = params.unwrap_or_else(|| json!({}));
    serde_json::from_value(params).map_err(|err| DispatchError::InvalidParams(err.to_string()))
}

fn tool_result(text: &str, is_error: bool) -> JsonValue {
    json!({
        "content": [{"type": "text", "text": text}],
        "isError": is_error
    })
}
