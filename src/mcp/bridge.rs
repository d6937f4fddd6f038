//! Public entry point: configuration, startup and the control handle.
//!
//! ```text
//!  BridgeHandle ──Command──▶ ConnectionManager ──frames──▶ Connector
//!       ▲                        │
//!       └── status / last error ◀┘ (Observable)
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::HandlerError;
use crate::mcp::backoff::ReconnectPolicy;
use crate::mcp::connection::{Command, ConnectionManager, ConnectionStatus};
use crate::mcp::dispatcher::ServerInfo;
use crate::mcp::instance::{InstanceResolver, DEFAULT_INSTANCE_ID};
use crate::mcp::notify::DEFAULT_KEEPALIVE_INTERVAL;
use crate::mcp::observable::{Observable, Subscription};
use crate::mcp::protocol::SERVER_NAME;
use crate::mcp::registry::{
    prompt_handler, resource_handler, tool_handler, PromptArguments, Registration, ToolArguments,
};
use crate::mcp::transport::Connector;
use crate::mcp::types::{
    PromptDescriptor, PromptResult, ResourceContents, ResourceDescriptor, ToolCallResult,
    ToolDescriptor,
};

/// Endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:3003";

/// Runtime settings for a [`Bridge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Base WebSocket URL; the instance id is appended as a path segment.
    pub endpoint: String,
    /// Instance id used when resolution fails.
    pub default_instance_id: String,
    /// Reconnect delays.
    pub reconnect: ReconnectPolicy,
    /// Period between keepalive pings while connected.
    pub keepalive_interval: Duration,
    /// Whether the bridge connects as soon as it starts.
    pub enabled: bool,
    /// Name reported on `initialize`.
    pub server_name: String,
    /// Version reported on `initialize`.
    pub server_version: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl BridgeConfig {
    /// Creates a configuration for `endpoint` with default settings.
    #[must_use]
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            default_instance_id: DEFAULT_INSTANCE_ID.to_string(),
            reconnect: ReconnectPolicy::default(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            enabled: true,
            server_name: SERVER_NAME.to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    #[must_use]
    pub fn with_default_instance_id(mut self, id: &str) -> Self {
        self.default_instance_id = id.to_string();
        self
    }

    #[must_use]
    pub const fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    #[must_use]
    pub const fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_server_name(mut self, name: &str) -> Self {
        self.server_name = name.to_string();
        self
    }

    #[must_use]
    pub fn with_server_version(mut self, version: &str) -> Self {
        self.server_version = version.to_string();
        self
    }

    /// URL for the given instance: `<endpoint>/<instance_id>`.
    #[must_use]
    pub fn url_for(&self, instance_id: &str) -> String {
        format!("{}/{instance_id}", self.endpoint.trim_end_matches('/'))
    }

    /// Server identity sent in the `initialize` response.
    #[must_use]
    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.server_name.clone(),
            version: self.server_version.clone(),
        }
    }
}

/// A running bridge.
///
/// Dropping the `Bridge` leaves the event loop running for as long as any
/// [`BridgeHandle`] exists; call [`Bridge::shutdown`] to stop it.
#[derive(Debug)]
pub struct Bridge {
    handle: BridgeHandle,
    task: JoinHandle<()>,
}

impl Bridge {
    /// Starts the event loop. Connects immediately if `config.enabled`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn init(
        config: BridgeConfig,
        connector: Arc<dyn Connector>,
        resolver: Arc<dyn InstanceResolver>,
    ) -> Self {
        let status = Observable::new(ConnectionStatus::Disconnected);
        let last_error = Observable::new(None);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let manager = ConnectionManager::new(
            config,
            connector,
            resolver,
            status.clone(),
            last_error.clone(),
        );
        let task = tokio::spawn(manager.run(commands_rx));

        Self {
            handle: BridgeHandle {
                commands: commands_tx,
                status,
                last_error,
            },
            task,
        }
    }

    /// A cloneable handle for registering capabilities and controlling the connection.
    #[must_use]
    pub fn handle(&self) -> BridgeHandle {
        self.handle.clone()
    }

    /// Disconnects and waits for the event loop to finish.
    pub async fn shutdown(self) {
        self.handle.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Bridge task ended abnormally");
        }
    }
}

/// Cloneable control surface for a running [`Bridge`].
///
/// Every call is queued to the event loop and returns immediately.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: Observable<ConnectionStatus>,
    last_error: Observable<Option<String>>,
}

impl BridgeHandle {
    /// Registers or replaces a tool, announcing the change if connected.
    pub fn register_tool<F, Fut>(&self, descriptor: ToolDescriptor, handler: F)
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolCallResult, HandlerError>> + Send + 'static,
    {
        self.register(Registration::Tool(descriptor, tool_handler(handler)));
    }

    /// Registers or replaces a resource, announcing the change if connected.
    pub fn register_resource<F, Fut>(&self, descriptor: ResourceDescriptor, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<ResourceContents>, HandlerError>> + Send + 'static,
    {
        self.register(Registration::Resource(descriptor, resource_handler(handler)));
    }

    /// Registers or replaces a prompt, announcing the change if connected.
    pub fn register_prompt<F, Fut>(&self, descriptor: PromptDescriptor, handler: F)
    where
        F: Fn(PromptArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PromptResult, HandlerError>> + Send + 'static,
    {
        self.register(Registration::Prompt(descriptor, prompt_handler(handler)));
    }

    /// Applies a prepared registration.
    pub fn register(&self, registration: Registration) {
        self.send(Command::Register(registration));
    }

    /// Allows connecting and starts a connection attempt.
    pub fn enable(&self) {
        self.send(Command::Enable);
    }

    /// Closes the connection and cancels any pending reconnect.
    pub fn disable(&self) {
        self.send(Command::Disable);
    }

    /// Drops the current connection and reconnects without waiting for backoff.
    ///
    /// Has no effect beyond the disconnect while the bridge is disabled.
    pub fn retry(&self) {
        self.send(Command::Retry);
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    /// Most recent connection error, cleared on each attempt and on success.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }

    /// Calls `callback` with the current status and on every change.
    pub fn subscribe_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.status.subscribe(callback)
    }

    /// Calls `callback` with the current error and on every change.
    pub fn subscribe_errors<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Option<String>) + Send + Sync + 'static,
    {
        self.last_error.subscribe(callback)
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Bridge stopped, command dropped");
        }
    }
}
