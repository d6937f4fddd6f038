//! Routes inbound JSON-RPC frames to the capability registries.
//!
//! The dispatcher is stateless with respect to the connection: it reads the
//! registry, answers list and `initialize` requests immediately, and turns
//! `tools/call`, `resources/read` and `prompts/get` into futures that the
//! connection manager runs concurrently. Each future resolves to exactly one
//! outgoing message carrying the request's `id`.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::HandlerError;
use crate::mcp::protocol::{
    parse_message, ClientNotification, ClientRequest, IncomingMessage, JsonRpcError,
    JsonRpcResponse, OutgoingMessage, RequestId, MCP_PROTOCOL_VERSION,
};
use crate::mcp::registry::CapabilityRegistry;

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ListChangedCapability,
    /// Resource-related capabilities.
    pub resources: ResourceCapabilities,
    /// Prompt-related capabilities.
    pub prompts: ListChangedCapability,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: ListChangedCapability { list_changed: true },
            resources: ResourceCapabilities {
                list_changed: true,
                subscribe: false,
            },
            prompts: ListChangedCapability { list_changed: true },
        }
    }
}

/// Capability supporting `list_changed` notifications.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListChangedCapability {
    /// Whether the list can change during the session.
    pub list_changed: bool,
}

/// Resource capabilities.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCapabilities {
    /// Whether the list can change during the session.
    pub list_changed: bool,
    /// Whether per-resource subscriptions are supported.
    pub subscribe: bool,
}

/// Server information for the initialisation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: crate::mcp::protocol::SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// What to do with one inbound frame.
pub enum Dispatch {
    /// Nothing to send.
    Ignore,
    /// Send this right away.
    Reply(OutgoingMessage),
    /// Run this handler call; send what it produces.
    Deferred(BoxFuture<'static, OutgoingMessage>),
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ignore => f.write_str("Ignore"),
            Self::Reply(msg) => f.debug_tuple("Reply").field(msg).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Decodes frames and routes them.
#[derive(Debug, Clone, Default)]
pub struct ProtocolDispatcher {
    server_info: ServerInfo,
}

impl ProtocolDispatcher {
    /// Creates a dispatcher that reports `server_info` on `initialize`.
    #[must_use]
    pub const fn new(server_info: ServerInfo) -> Self {
        Self { server_info }
    }

    /// Handles one inbound text frame.
    pub fn dispatch(&self, registry: &CapabilityRegistry, frame: &str) -> Dispatch {
        match parse_message(frame) {
            Ok(IncomingMessage::Request { id, request }) => {
                self.handle_request(registry, id, request)
            }
            Ok(IncomingMessage::Notification(notification)) => {
                match notification {
                    ClientNotification::Initialized => debug!("Client initialised"),
                    ClientNotification::Other(method) => {
                        debug!(method = %method, "Ignoring notification");
                    }
                }
                Dispatch::Ignore
            }
            Err(e) => {
                warn!(error = %e, "Dropping inbound frame");
                Dispatch::Ignore
            }
        }
    }

    fn handle_request(
        &self,
        registry: &CapabilityRegistry,
        id: RequestId,
        request: ClientRequest,
    ) -> Dispatch {
        match request {
            ClientRequest::Initialize => Dispatch::Reply(self.initialize(id)),
            ClientRequest::Ping => {
                Dispatch::Reply(JsonRpcResponse::success(id, json!({})).into())
            }
            ClientRequest::ListTools => {
                let tools: Vec<_> = registry.tools().collect();
                Dispatch::Reply(success(id, &json!({ "tools": tools })))
            }
            ClientRequest::ListResources => {
                let resources: Vec<_> = registry.resources().collect();
                Dispatch::Reply(success(id, &json!({ "resources": resources })))
            }
            ClientRequest::ListPrompts => {
                let prompts: Vec<_> = registry.prompts().collect();
                Dispatch::Reply(success(id, &json!({ "prompts": prompts })))
            }
            ClientRequest::CallTool { name, arguments } => match registry.tool(&name) {
                Some(handler) => deferred(id, async move { handler(arguments).await }),
                None => Dispatch::Reply(JsonRpcError::not_found(id, "Tool", &name).into()),
            },
            ClientRequest::ReadResource { uri } => match registry.resource(&uri) {
                Some(handler) => deferred(id, async move {
                    handler()
                        .await
                        .map(|contents| ContentsEnvelope { contents })
                }),
                None => Dispatch::Reply(JsonRpcError::not_found(id, "Resource", &uri).into()),
            },
            ClientRequest::GetPrompt { name, arguments } => match registry.prompt(&name) {
                Some(handler) => deferred(id, async move { handler(arguments).await }),
                None => Dispatch::Reply(JsonRpcError::not_found(id, "Prompt", &name).into()),
            },
            ClientRequest::Unrecognized(method) => {
                debug!(method = %method, id = %id, "Ignoring unrecognised method");
                Dispatch::Ignore
            }
        }
    }

    fn initialize(&self, id: RequestId) -> OutgoingMessage {
        success(
            id,
            &json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": ServerCapabilities::default(),
                "serverInfo": self.server_info,
            }),
        )
    }
}

#[derive(Serialize)]
struct ContentsEnvelope<T> {
    contents: T,
}

/// Serialises `result` into a success response, or a handler failure if that fails.
fn success<T: Serialize>(id: RequestId, result: &T) -> OutgoingMessage {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value).into(),
        Err(e) => {
            warn!(error = %e, "Failed to serialise result");
            JsonRpcError::handler_failed(id, format!("Failed to serialise result: {e}")).into()
        }
    }
}

/// Wraps a handler call so that failures and panics become `-32000` errors.
fn deferred<T, F>(id: RequestId, call: F) -> Dispatch
where
    T: Serialize + Send + 'static,
    F: std::future::Future<Output = Result<T, HandlerError>> + Send + 'static,
{
    Dispatch::Deferred(
        async move {
            match AssertUnwindSafe(call).catch_unwind().await {
                Ok(Ok(result)) => success(id, &result),
                Ok(Err(e)) => {
                    warn!(id = %id, error = %e, "Handler failed");
                    JsonRpcError::handler_failed(id, e.message()).into()
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!(id = %id, panic = %message, "Handler panicked");
                    JsonRpcError::handler_failed(id, message).into()
                }
            }
        }
        .boxed(),
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| HandlerError::UNKNOWN.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use crate::mcp::registry::{prompt_handler, resource_handler, tool_handler, ToolArguments};
    use crate::mcp::types::{
        PromptDescriptor, PromptMessage, PromptResult, ResourceContents, ResourceDescriptor, Role,
        ToolCallResult, ToolDescriptor,
    };

    async fn explode(_: ToolArguments) -> Result<ToolCallResult, HandlerError> {
        panic!("handler exploded")
    }

    fn registry() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        registry.register_tool(
            ToolDescriptor::new("echo", "Echo text", json!({"type": "object"})),
            tool_handler(|args| async move {
                let text = args
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok::<_, HandlerError>(ToolCallResult::text(text))
            }),
        );
        registry.register_tool(
            ToolDescriptor::new("my-tool", "Always fails", json!({"type": "object"})),
            tool_handler(|_| async { Err::<ToolCallResult, _>(HandlerError::from("boom")) }),
        );
        registry.register_tool(
            ToolDescriptor::new("silent", "Fails without a message", json!({"type": "object"})),
            tool_handler(|_| async { Err::<ToolCallResult, _>(HandlerError::new("")) }),
        );
        registry.register_tool(
            ToolDescriptor::new("panics", "Panics", json!({"type": "object"})),
            tool_handler(explode),
        );
        registry.register_resource(
            ResourceDescriptor::new("host://info").with_mime_type("text/plain"),
            resource_handler(|| async {
                Ok::<_, HandlerError>(vec![ResourceContents::text("host://info", "hi")])
            }),
        );
        registry.register_prompt(
            PromptDescriptor::new("greet").with_description("Say hello"),
            prompt_handler(|args| async move {
                let who = args
                    .and_then(|a| a.get("who").cloned())
                    .unwrap_or_else(|| "world".to_string());
                Ok::<_, HandlerError>(PromptResult {
                    description: None,
                    messages: vec![PromptMessage::text(Role::User, format!("Hello, {who}"))],
                })
            }),
        );
        registry
    }

    async fn run(frame: &str) -> Option<Value> {
        let dispatcher = ProtocolDispatcher::default();
        match dispatcher.dispatch(&registry(), frame) {
            Dispatch::Ignore => None,
            Dispatch::Reply(msg) => Some(msg.to_value()),
            Dispatch::Deferred(fut) => Some(fut.await.to_value()),
        }
    }

    #[tokio::test]
    async fn initialize_echoes_id_and_version() {
        let reply = run(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(
            reply["result"]["capabilities"],
            json!({
                "tools": {"listChanged": true},
                "resources": {"listChanged": true, "subscribe": false},
                "prompts": {"listChanged": true}
            })
        );
        assert_eq!(reply["result"]["serverInfo"]["name"], "mcp-socket-bridge");
    }

    #[tokio::test]
    async fn tools_list_in_registration_order() {
        let reply = run(r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#)
            .await
            .unwrap();
        assert_eq!(reply["id"], "a");
        let names: Vec<_> = reply["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["echo", "my-tool", "silent", "panics"]);
    }

    #[tokio::test]
    async fn call_tool_runs_handler() {
        let reply = run(
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{"text":"hi"}}}"#,
        )
        .await
        .unwrap();
        assert_eq!(reply["result"]["content"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let reply = run(
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"nope"}}"#,
        )
        .await
        .unwrap();
        assert_eq!(reply["id"], 3);
        assert_eq!(reply["error"]["code"], -32601);
        assert!(reply["error"]["message"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn failing_handler_is_server_error() {
        let reply = run(
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"my-tool"}}"#,
        )
        .await
        .unwrap();
        assert_eq!(
            reply,
            json!({"jsonrpc": "2.0", "id": 4, "error": {"code": -32000, "message": "boom"}})
        );
    }

    #[tokio::test]
    async fn messageless_failure_is_unknown_error() {
        let reply = run(
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"silent"}}"#,
        )
        .await
        .unwrap();
        assert_eq!(reply["error"]["message"], "Unknown error");
    }

    #[tokio::test]
    async fn panicking_handler_is_server_error() {
        let reply = run(
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"panics"}}"#,
        )
        .await
        .unwrap();
        assert_eq!(reply["error"]["code"], -32000);
        assert_eq!(reply["error"]["message"], "handler exploded");
    }

    #[tokio::test]
    async fn read_resource_wraps_contents() {
        let reply = run(
            r#"{"jsonrpc":"2.0","id":7,"method":"resources/read","params":{"uri":"host://info"}}"#,
        )
        .await
        .unwrap();
        assert_eq!(
            reply["result"],
            json!({"contents": [{"uri": "host://info", "text": "hi"}]})
        );
    }

    #[tokio::test]
    async fn unknown_resource_names_uri() {
        let reply = run(
            r#"{"jsonrpc":"2.0","id":8,"method":"resources/read","params":{"uri":"host://missing"}}"#,
        )
        .await
        .unwrap();
        assert_eq!(reply["error"]["code"], -32601);
        assert_eq!(reply["error"]["message"], "Resource not found: host://missing");
    }

    #[tokio::test]
    async fn get_prompt_passes_arguments() {
        let reply = run(
            r#"{"jsonrpc":"2.0","id":9,"method":"prompts/get","params":{"name":"greet","arguments":{"who":"Ada"}}}"#,
        )
        .await
        .unwrap();
        assert_eq!(
            reply["result"]["messages"][0]["content"]["text"],
            "Hello, Ada"
        );
    }

    #[tokio::test]
    async fn lists_resources_and_prompts() {
        let resources = run(r#"{"jsonrpc":"2.0","id":10,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(resources["result"]["resources"][0]["uri"], "host://info");

        let prompts = run(r#"{"jsonrpc":"2.0","id":11,"method":"prompts/list"}"#)
            .await
            .unwrap();
        assert_eq!(prompts["result"]["prompts"][0]["name"], "greet");
    }

    #[tokio::test]
    async fn ping_gets_empty_result() {
        let reply = run(r#"{"jsonrpc":"2.0","id":12,"method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(reply["result"], json!({}));
    }

    #[tokio::test]
    async fn unknown_method_is_ignored() {
        assert!(run(r#"{"jsonrpc":"2.0","id":13,"method":"logging/setLevel"}"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn request_without_id_is_never_answered() {
        assert!(run(r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"echo"}}"#)
            .await
            .is_none());
        assert!(run(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped() {
        assert!(run("{oops").await.is_none());
    }
}
