//! Connection lifecycle, reconnection and keepalive.
//!
//! [`ConnectionManager`] is the bridge's event loop. It runs as a single
//! task and is the only owner of the transport, the registries, the status
//! and the reconnect counter, so none of them need locking. Everything else
//! reaches it through [`Command`]s.
//!
//! # State machine
//!
//! ```text
//!                 connect()                 Opened
//! disconnected ─────────────▶ connecting ─────────────▶ connected
//!      ▲  ▲                       │                        │
//!      │  │        open() failed  ▼            Closed      │
//!      │  └───── timer ─────── error                       │
//!      └──────────────────────────────────────────────────┘
//! ```
//!
//! Every `Closed` and every failed `open()` schedules one reconnect after
//! `min(base * 2^attempt, max)` unless the bridge is disabled.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::mcp::bridge::BridgeConfig;
use crate::mcp::dispatcher::{Dispatch, ProtocolDispatcher};
use crate::mcp::instance::{self, InstanceResolver};
use crate::mcp::notify::{self, Keepalive};
use crate::mcp::observable::Observable;
use crate::mcp::protocol::OutgoingMessage;
use crate::mcp::registry::{CapabilityRegistry, Registration};
use crate::mcp::transport::{Connector, TransportEvent, TransportLink};
use crate::mcp::types::CapabilityKind;

/// Connection status of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// No transport and no attempt in progress.
    Disconnected,
    /// Resolving the instance or waiting for the transport to open.
    Connecting,
    /// Transport open; requests are served.
    Connected,
    /// The transport could not be constructed; a retry is scheduled.
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Requests from [`crate::mcp::bridge::BridgeHandle`] to the event loop.
#[derive(Debug)]
pub enum Command {
    /// Add or replace a capability.
    Register(Registration),
    /// Allow connecting and connect now.
    Enable,
    /// Drop the connection and stop reconnecting.
    Disable,
    /// Drop the connection and reconnect immediately.
    Retry,
    /// Disable and leave the event loop.
    Shutdown,
}

type HandlerOutcome = (u64, OutgoingMessage);

/// The bridge's event loop state.
pub struct ConnectionManager {
    config: BridgeConfig,
    connector: Arc<dyn Connector>,
    resolver: Arc<dyn InstanceResolver>,
    registry: CapabilityRegistry,
    dispatcher: ProtocolDispatcher,
    status: Observable<ConnectionStatus>,
    last_error: Observable<Option<String>>,
    enabled: bool,
    attempt: u32,
    /// Bumped on every connect; responses from older connections are dropped.
    generation: u64,
    resolving: Option<BoxFuture<'static, String>>,
    link: Option<TransportLink>,
    link_open: bool,
    reconnect_at: Option<Instant>,
    keepalive: Keepalive,
    in_flight: JoinSet<HandlerOutcome>,
}

impl ConnectionManager {
    /// Creates a disabled, disconnected manager.
    #[must_use]
    pub fn new(
        config: BridgeConfig,
        connector: Arc<dyn Connector>,
        resolver: Arc<dyn InstanceResolver>,
        status: Observable<ConnectionStatus>,
        last_error: Observable<Option<String>>,
    ) -> Self {
        let dispatcher = ProtocolDispatcher::new(config.server_info());
        let keepalive = Keepalive::new(config.keepalive_interval);
        Self {
            config,
            connector,
            resolver,
            registry: CapabilityRegistry::new(),
            dispatcher,
            status,
            last_error,
            enabled: false,
            attempt: 0,
            generation: 0,
            resolving: None,
            link: None,
            link_open: false,
            reconnect_at: None,
            keepalive,
            in_flight: JoinSet::new(),
        }
    }

    /// Runs until [`Command::Shutdown`] arrives or every handle is dropped.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        if self.config.enabled {
            self.enable();
        }

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => {
                        info!("Bridge shutting down");
                        self.disable();
                        break;
                    }
                    Some(command) => self.handle_command(command),
                },

                instance_id = wait_resolved(&mut self.resolving) => self.on_resolved(&instance_id),

                event = wait_event(&mut self.link) => self.on_transport_event(event),

                () = wait_deadline(self.reconnect_at) => self.on_reconnect_timer(),

                () = self.keepalive.tick() => self.on_keepalive(),

                Some(joined) = self.in_flight.join_next() => self.on_handler_done(joined),
            }
        }
    }

    /// Number of reconnect attempts since the last successful open.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Register(registration) => self.register(registration),
            Command::Enable => self.enable(),
            Command::Disable => self.disable(),
            Command::Retry => self.retry(),
            Command::Shutdown => {}
        }
    }

    fn register(&mut self, registration: Registration) {
        debug!(registration = ?registration, "Registering capability");
        let kind = self.registry.apply(registration);
        if self.status.get() == ConnectionStatus::Connected {
            self.announce(kind);
        }
    }

    fn enable(&mut self) {
        self.enabled = true;
        self.connect();
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.teardown();
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn retry(&mut self) {
        info!("Manual retry requested");
        self.teardown();
        self.set_status(ConnectionStatus::Disconnected);
        self.connect();
    }

    /// Starts a connection attempt if enabled and idle.
    fn connect(&mut self) {
        if !self.enabled {
            debug!("Connect ignored, bridge disabled");
            return;
        }

        let status = self.status.get();
        if !matches!(
            status,
            ConnectionStatus::Disconnected | ConnectionStatus::Error
        ) {
            debug!(status = %status, "Connect ignored, attempt already in progress");
            return;
        }

        self.set_status(ConnectionStatus::Connecting);
        self.last_error.set(None);
        self.generation += 1;

        let resolver = Arc::clone(&self.resolver);
        let fallback = self.config.default_instance_id.clone();
        self.resolving = Some(
            async move { instance::resolve_or_default(resolver.as_ref(), &fallback).await }.boxed(),
        );
    }

    fn on_resolved(&mut self, instance_id: &str) {
        self.resolving = None;
        let url = self.config.url_for(instance_id);
        info!(url = %url, attempt = self.attempt, "Opening transport");

        match self.connector.open(&url) {
            Ok(link) => {
                self.link = Some(link);
                self.link_open = false;
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to open transport");
                self.last_error.set(Some(e.to_string()));
                self.set_status(ConnectionStatus::Error);
                self.keepalive.stop();
                self.schedule_reconnect();
            }
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                self.link_open = true;
                self.attempt = 0;
                self.last_error.set(None);
                self.set_status(ConnectionStatus::Connected);
                for kind in CapabilityKind::ALL {
                    self.announce(kind);
                }
                self.keepalive.start();
            }
            TransportEvent::Message(frame) => self.handle_frame(&frame),
            TransportEvent::Error(message) => {
                warn!(error = %message, "Transport error");
                self.last_error.set(Some(message));
            }
            TransportEvent::Closed => {
                self.link = None;
                self.link_open = false;
                self.keepalive.stop();
                self.set_status(ConnectionStatus::Disconnected);
                self.schedule_reconnect();
            }
        }
    }

    fn handle_frame(&mut self, frame: &str) {
        trace!(frame, "Inbound frame");
        match self.dispatcher.dispatch(&self.registry, frame) {
            Dispatch::Ignore => {}
            Dispatch::Reply(message) => self.send(&message),
            Dispatch::Deferred(call) => {
                let generation = self.generation;
                self.in_flight.spawn(async move { (generation, call.await) });
            }
        }
    }

    fn on_handler_done(&mut self, joined: Result<HandlerOutcome, JoinError>) {
        match joined {
            Ok((generation, message)) if generation == self.generation => self.send(&message),
            Ok(_) => debug!("Dropping response for a previous connection"),
            Err(e) => warn!(error = %e, "Handler task did not complete"),
        }
    }

    fn schedule_reconnect(&mut self) {
        if !self.enabled {
            debug!("Reconnect suppressed, bridge disabled");
            return;
        }

        let delay = self.config.reconnect.delay_for(self.attempt);
        info!(attempt = self.attempt, delay = ?delay, "Scheduling reconnect");
        self.reconnect_at = Some(notify::deadline_after(delay));
    }

    fn on_reconnect_timer(&mut self) {
        self.reconnect_at = None;
        self.attempt = self.attempt.saturating_add(1);
        self.connect();
    }

    fn on_keepalive(&self) {
        if self.link_open {
            trace!("Sending keepalive ping");
            self.send(&notify::ping().into());
        }
    }

    fn announce(&self, kind: CapabilityKind) {
        debug!(kind = %kind, "Announcing list change");
        self.send(&notify::list_changed(kind).into());
    }

    /// Cancels timers and pending work and drops the transport.
    fn teardown(&mut self) {
        self.reconnect_at = None;
        self.keepalive.stop();
        self.resolving = None;
        if self.link.take().is_some() {
            debug!("Closing transport");
        }
        self.link_open = false;
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.get();
        if self.status.set(status) {
            info!(from = %previous, to = %status, "Connection status changed");
        }
    }

    /// Writes a message if the transport is open; otherwise drops it.
    fn send(&self, message: &OutgoingMessage) {
        let Some(link) = self.link.as_ref().filter(|_| self.link_open) else {
            debug!("Transport not open, dropping outbound message");
            return;
        };

        match message.to_frame() {
            Ok(frame) => {
                if !link.send(frame) {
                    debug!("Transport gone, dropping outbound message");
                }
            }
            Err(e) => error!(error = %e, "Failed to serialise outbound message"),
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &self.status.get())
            .field("enabled", &self.enabled)
            .field("attempt", &self.attempt)
            .field("generation", &self.generation)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

async fn wait_resolved(resolving: &mut Option<BoxFuture<'static, String>>) -> String {
    match resolving.as_mut() {
        Some(resolution) => resolution.await,
        None => std::future::pending().await,
    }
}

async fn wait_event(link: &mut Option<TransportLink>) -> TransportEvent {
    match link.as_mut() {
        Some(link) => link.next_event().await,
        None => std::future::pending().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
