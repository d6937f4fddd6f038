//! JSON-RPC 2.0 message types for the bridge.
//!
//! Inbound frames are decoded into [`IncomingMessage`], a closed set of the
//! methods the bridge understands plus an `Unrecognized` variant. Nothing
//! downstream inspects raw JSON.
//!
//! # Message Types
//!
//! - **Request**: has an `id`, expects a response
//! - **Notification**: no `id`, never answered
//! - **Response / Error**: outbound replies echoing the request `id`
//!
//! Only two error codes are ever emitted: `-32601` when a tool, resource or
//! prompt is not registered, and `-32000` when a handler fails. Frames that
//! cannot be decoded are dropped, not answered.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FrameError;

/// The MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Default server name for capability negotiation.
pub const SERVER_NAME: &str = "mcp-socket-bridge";

/// A JSON-RPC 2.0 request ID.
///
/// IDs must be strings or numbers, never `null`. Numbers keep their JSON
/// form, so large and fractional IDs are echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(serde_json::Number),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A request the bridge knows how to answer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientRequest {
    /// `initialize`
    Initialize,
    /// `ping`
    Ping,
    /// `tools/list`
    ListTools,
    /// `tools/call`
    CallTool {
        /// Tool name to look up.
        name: String,
        /// Arguments passed to the handler.
        arguments: Map<String, Value>,
    },
    /// `resources/list`
    ListResources,
    /// `resources/read`
    ReadResource {
        /// Resource URI to look up.
        uri: String,
    },
    /// `prompts/list`
    ListPrompts,
    /// `prompts/get`
    GetPrompt {
        /// Prompt name to look up.
        name: String,
        /// Optional template arguments.
        arguments: Option<HashMap<String, String>>,
    },
    /// Any other method. Never answered.
    Unrecognized(String),
}

impl ClientRequest {
    /// Decodes a request from its method name and params.
    ///
    /// Params are read leniently: a missing key is looked up as the empty
    /// string and non-object arguments are treated as empty.
    #[must_use]
    pub fn decode(method: &str, params: Option<&Value>) -> Self {
        match method {
            "initialize" => Self::Initialize,
            "ping" => Self::Ping,
            "tools/list" => Self::ListTools,
            "tools/call" => Self::CallTool {
                name: string_param(params, "name"),
                arguments: params
                    .and_then(|p| p.get("arguments"))
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            },
            "resources/list" => Self::ListResources,
            "resources/read" => Self::ReadResource {
                uri: string_param(params, "uri"),
            },
            "prompts/list" => Self::ListPrompts,
            "prompts/get" => Self::GetPrompt {
                name: string_param(params, "name"),
                arguments: params
                    .and_then(|p| p.get("arguments"))
                    .and_then(Value::as_object)
                    .map(prompt_arguments),
            },
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

fn string_param(params: Option<&Value>, key: &str) -> String {
    params
        .and_then(|p| p.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn prompt_arguments(args: &Map<String, Value>) -> HashMap<String, String> {
    args.iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect()
}

/// A notification from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientNotification {
    /// `notifications/initialized`
    Initialized,
    /// Any other notification, including request-shaped methods sent without an `id`.
    Other(String),
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// A request expecting a response.
    Request {
        /// The client-supplied id to echo.
        id: RequestId,
        /// What the client asked for.
        request: ClientRequest,
    },
    /// A notification (no response expected).
    Notification(ClientNotification),
}

impl IncomingMessage {
    /// Returns the request ID if this is a request.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request { id, .. } => Some(id),
            Self::Notification(_) => None,
        }
    }
}

/// Parses one inbound text frame into a classified message.
///
/// # Errors
///
/// Returns a [`FrameError`] describing why the frame should be dropped.
pub fn parse_message(json: &str) -> Result<IncomingMessage, FrameError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| FrameError::MalformedJson(e.to_string()))?;

    let obj = value.as_object().ok_or(FrameError::NotAnObject)?;

    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(FrameError::UnsupportedVersion);
    }

    let method = obj
        .get("method")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingMethod)?;
    let params = obj.get("params");

    match obj.get("id") {
        Some(raw_id) => {
            let id: RequestId =
                serde_json::from_value(raw_id.clone()).map_err(|_| FrameError::InvalidId)?;
            Ok(IncomingMessage::Request {
                id,
                request: ClientRequest::decode(method, params),
            })
        }
        None => {
            let notification = match method {
                "notifications/initialized" => ClientNotification::Initialized,
                other => ClientNotification::Other(other.to_string()),
            };
            Ok(IncomingMessage::Notification(notification))
        }
    }
}

/// An outgoing JSON-RPC 2.0 notification (bridge to client).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingNotification {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl OutgoingNotification {
    /// Creates a new outgoing notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this response corresponds to.
    pub id: RequestId,

    /// The result of the method call.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// Error codes the bridge emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Tool, resource or prompt not registered.
    NotFound,
    /// A capability handler failed.
    HandlerFailed,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::NotFound => -32601,
            Self::HandlerFailed => -32000,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,
}

impl JsonRpcErrorData {
    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }
}

/// A JSON-RPC 2.0 error response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this error corresponds to.
    pub id: RequestId,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates a new error response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: RequestId, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error,
        }
    }

    /// Creates a not-found error naming the missing key.
    #[must_use]
    pub fn not_found(id: RequestId, kind: &str, key: &str) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::NotFound, format!("{kind} not found: {key}")),
        )
    }

    /// Creates a handler failure error carrying the handler's message.
    #[must_use]
    pub fn handler_failed(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::HandlerFailed, message),
        )
    }
}

/// Any message the bridge writes to the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    /// A success response.
    Response(JsonRpcResponse),
    /// An error response.
    Error(JsonRpcError),
    /// An unsolicited notification.
    Notification(OutgoingNotification),
}

impl OutgoingMessage {
    /// Serialises the message as a single newline-free JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        let json = serde_json::to_string(self)?;
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );
        Ok(json)
    }

    /// Converts the message to a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<JsonRpcResponse> for OutgoingMessage {
    fn from(response: JsonRpcResponse) -> Self {
        Self::Response(response)
    }
}

impl From<JsonRpcError> for OutgoingMessage {
    fn from(error: JsonRpcError) -> Self {
        Self::Error(error)
    }
}

impl From<OutgoingNotification> for OutgoingMessage {
    fn from(notification: OutgoingNotification) -> Self {
        Self::Notification(notification)
    }
}
