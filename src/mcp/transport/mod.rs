//! Transports carrying JSON-RPC text frames between the bridge and its client.
//!
//! A [`Connector`] opens a [`TransportLink`] for a URL. Opening is split in
//! two phases:
//!
//! - [`Connector::open`] runs synchronously and fails only if the transport
//!   cannot even be constructed (for example an unparsable URL)
//! - the connection itself completes in the background and reports back
//!   through [`TransportEvent`]s: `Opened`, then any number of `Message` and
//!   `Error`, then `Closed`
//!
//! Dropping the link closes the transport.

pub mod memory;
pub mod websocket;

use tokio::sync::mpsc;

use crate::error::TransportError;

pub use memory::{MemoryConnector, MemoryListener, MemoryPeer};
pub use websocket::WebSocketConnector;

/// Something the transport reports to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established and frames may be sent.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// The transport hit an error. A `Closed` event normally follows.
    Error(String),
    /// The connection is gone.
    Closed,
}

/// Opens transports.
pub trait Connector: Send + Sync {
    /// Starts connecting to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be constructed at all.
    fn open(&self, url: &str) -> Result<TransportLink, TransportError>;
}

/// The bridge's side of one transport.
#[derive(Debug)]
pub struct TransportLink {
    outbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportLink {
    /// Builds a link from its two channel ends.
    #[must_use]
    pub const fn new(
        outbound: mpsc::UnboundedSender<String>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outbound, events }
    }

    /// Queues a text frame. Returns `false` if the transport is gone.
    pub fn send(&self, frame: String) -> bool {
        self.outbound.send(frame).is_ok()
    }

    /// Waits for the next event. A vanished transport reads as `Closed`.
    pub async fn next_event(&mut self) -> TransportEvent {
        self.events.recv().await.unwrap_or(TransportEvent::Closed)
    }
}
