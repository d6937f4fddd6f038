//! mcp-socket-bridge: expose local capabilities to a remote MCP client over a WebSocket
//!
//! The bridge keeps a persistent client connection to a WebSocket endpoint and
//! answers the MCP JSON-RPC requests that arrive on it from registries of
//! tools, resources and prompts.
//!
//! # Architecture
//!
//! The bridge owns the connection; capability producers only register:
//!
//! - **Connection**: connect, reconnect with exponential backoff, keepalive pings
//! - **Dispatch**: decode JSON-RPC frames, route to handlers, encode replies
//! - **Registries**: tools, resources and prompts, announced via `list_changed`
//!
//! Producers decide what the capabilities are and register them at any time
//! through a [`mcp::BridgeHandle`].
//!
//! # Modules
//!
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Error types
//! - [`host`] — Built-in host capabilities
//! - [`mcp`] — MCP bridge implementation

pub mod config;
pub mod error;
pub mod host;
pub mod mcp;
