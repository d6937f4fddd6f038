//! Built-in capabilities describing the machine the bridge runs on.
//!
//! | Kind | Key | Returns |
//! |------|-----|---------|
//! | tool | `host_info` | OS, architecture and bridge version as JSON text |
//! | tool | `echo` | its `text` argument |
//! | resource | `host://info` | the same JSON as `host_info` |
//! | prompt | `summarise_host` | a user message asking for a summary of the host |

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::HandlerError;
use crate::mcp::bridge::BridgeHandle;
use crate::mcp::registry::{PromptArguments, ToolArguments};
use crate::mcp::types::{
    PromptDescriptor, PromptMessage, PromptResult, ResourceContents, ResourceDescriptor, Role,
    ToolCallResult, ToolDescriptor,
};

/// URI of the host information resource.
pub const HOST_INFO_URI: &str = "host://info";

/// Facts about the current host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    /// Operating system, e.g. `linux`.
    pub os: String,
    /// OS family, e.g. `unix`.
    pub family: String,
    /// CPU architecture, e.g. `x86_64`.
    pub arch: String,
    /// Bridge package name.
    pub bridge: String,
    /// Bridge package version.
    pub version: String,
}

impl HostInfo {
    /// Collects information about the running process's host.
    #[must_use]
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            family: std::env::consts::FAMILY.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            bridge: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn to_json(&self) -> Result<String, HandlerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Registers every built-in capability with the bridge.
pub fn register(bridge: &BridgeHandle) {
    bridge.register_tool(host_info_descriptor(), host_info);
    bridge.register_tool(echo_descriptor(), echo);
    bridge.register_resource(host_resource_descriptor(), read_host_resource);
    bridge.register_prompt(summarise_host_descriptor(), summarise_host);
}

fn host_info_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "host_info",
        "Report the operating system, architecture and bridge version of the host",
        json!({
            "type": "object",
            "properties": {}
        }),
    )
}

fn echo_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "echo",
        "Return the given text unchanged. Useful for checking the connection.",
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "Text to send back"
                }
            },
            "required": ["text"]
        }),
    )
}

fn host_resource_descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(HOST_INFO_URI)
        .with_name("Host information")
        .with_description("Operating system, architecture and bridge version")
        .with_mime_type("application/json")
}

fn summarise_host_descriptor() -> PromptDescriptor {
    PromptDescriptor::new("summarise_host")
        .with_description("Ask for a short summary of the host the bridge runs on")
        .with_argument("focus", Some("Aspect to concentrate on"), false)
}

async fn host_info(_arguments: ToolArguments) -> Result<ToolCallResult, HandlerError> {
    Ok(ToolCallResult::text(HostInfo::current().to_json()?))
}

async fn echo(arguments: ToolArguments) -> Result<ToolCallResult, HandlerError> {
    match arguments.get("text").and_then(Value::as_str) {
        Some(text) => Ok(ToolCallResult::text(text)),
        None => Err(HandlerError::new("Missing required argument: text")),
    }
}

async fn read_host_resource() -> Result<Vec<ResourceContents>, HandlerError> {
    let contents = ResourceContents::text(HOST_INFO_URI, HostInfo::current().to_json()?)
        .with_mime_type("application/json");
    Ok(vec![contents])
}

async fn summarise_host(arguments: PromptArguments) -> Result<PromptResult, HandlerError> {
    let info = HostInfo::current().to_json()?;
    let focus = arguments
        .as_ref()
        .and_then(|args| args.get("focus"))
        .filter(|focus| !focus.trim().is_empty());

    let request = match focus {
        Some(focus) => format!(
            "Summarise this host in two sentences, concentrating on {focus}.\n\n{info}"
        ),
        None => format!("Summarise this host in two sentences.\n\n{info}"),
    };

    Ok(PromptResult {
        description: Some("Summary of the bridge host".to_string()),
        messages: vec![PromptMessage::text(Role::User, request)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::types::{PromptContent, ToolContent};
    use std::collections::HashMap;

    fn text_of(result: &ToolCallResult) -> &str {
        match &result.content[0] {
            ToolContent::Text { text } => text,
            ToolContent::Image { .. } => panic!("Expected text content"),
        }
    }

    #[test]
    fn host_info_matches_build() {
        let info = HostInfo::current();
        assert_eq!(info.os, std::env::consts::OS);
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn host_info_tool_returns_json() {
        let result = host_info(ToolArguments::new()).await.unwrap();
        let parsed: Value = serde_json::from_str(text_of(&result)).unwrap();
        assert_eq!(parsed["arch"], std::env::consts::ARCH);
        assert_eq!(parsed["bridge"], "mcp-socket-bridge");
    }

    #[tokio::test]
    async fn echo_returns_text() {
        let mut args = ToolArguments::new();
        args.insert("text".to_string(), json!("hello"));
        let result = echo(args).await.unwrap();
        assert_eq!(text_of(&result), "hello");
    }

    #[tokio::test]
    async fn echo_requires_text() {
        let err = echo(ToolArguments::new()).await.unwrap_err();
        assert!(err.message().contains("text"));
    }

    #[tokio::test]
    async fn resource_is_json() {
        let contents = read_host_resource().await.unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].uri, HOST_INFO_URI);
        assert_eq!(contents[0].mime_type.as_deref(), Some("application/json"));
        assert!(contents[0].text.as_deref().unwrap().contains("\"os\""));
    }

    #[tokio::test]
    async fn prompt_uses_focus() {
        let args = HashMap::from([("focus".to_string(), "architecture".to_string())]);
        let result = summarise_host(Some(args)).await.unwrap();
        let PromptContent::Text { text } = &result.messages[0].content;
        assert!(text.contains("concentrating on architecture"));
        assert_eq!(result.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn prompt_without_arguments() {
        let result = summarise_host(None).await.unwrap();
        let PromptContent::Text { text } = &result.messages[0].content;
        assert!(!text.contains("concentrating"));
    }

    #[test]
    fn descriptors_have_expected_keys() {
        assert_eq!(host_info_descriptor().name, "host_info");
        assert_eq!(echo_descriptor().input_schema["required"][0], "text");
        assert_eq!(host_resource_descriptor().uri, HOST_INFO_URI);
        assert_eq!(summarise_host_descriptor().arguments.len(), 1);
    }
}
