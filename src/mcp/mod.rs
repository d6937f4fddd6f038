//! Model Context Protocol (MCP) bridge.
//!
//! Exposes locally registered tools, resources and prompts to a remote MCP
//! client. The bridge dials out to a WebSocket endpoint and serves JSON-RPC
//! 2.0 requests arriving on that connection, reconnecting with exponential
//! backoff whenever the connection drops.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    ConnectionManager (task)                   │
//! │                                                               │
//! │   ┌─────────────┐    ┌──────────────┐    ┌────────────────┐   │
//! │   │  Transport  │───▶│  Dispatcher  │───▶│   Registry     │   │
//! │   │ (WebSocket) │    │  (JSON-RPC)  │    │ (tools, ...)   │   │
//! │   └─────────────┘    └──────────────┘    └────────────────┘   │
//! │          ▲                                       ▲            │
//! │   reconnect backoff, keepalive            Register commands   │
//! └───────────────────────────────────────────────────────────────┘
//!                                   ▲
//!                             BridgeHandle
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod backoff;
pub mod bridge;
pub mod connection;
pub mod dispatcher;
pub mod instance;
pub mod notify;
pub mod observable;
pub mod protocol;
pub mod registry;
pub mod transport;
pub mod types;

pub use bridge::{Bridge, BridgeConfig, BridgeHandle};
pub use connection::ConnectionStatus;
pub use instance::{AccountInstance, InstanceResolver, StaticInstance};
pub use protocol::MCP_PROTOCOL_VERSION;
pub use transport::{Connector, MemoryConnector, WebSocketConnector};
