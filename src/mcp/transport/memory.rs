//! In-process transport.
//!
//! [`MemoryConnector::new`] returns a connector and a [`MemoryListener`].
//! Every `open` hands a [`MemoryPeer`] to the listener; the peer plays the
//! remote endpoint and decides when the link opens, closes or errors.
//!
//! ```text
//! bridge send() ----> outbound ----> peer.recv()
//! peer.send_text() -> events   ----> bridge
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::mcp::transport::{Connector, TransportEvent, TransportLink};

#[derive(Debug, Default)]
struct ConnectorState {
    fail_with: Option<String>,
    attempts: Vec<(Instant, String)>,
}

/// Connector whose links are driven by a [`MemoryListener`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    /// Creates a connector and the listener receiving its peers.
    #[must_use]
    pub fn new() -> (Self, MemoryListener) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(Mutex::new(ConnectorState::default())),
            peers: peers_tx,
        };
        (connector, MemoryListener { peers: peers_rx })
    }

    /// Makes every subsequent `open` fail synchronously with `reason`,
    /// or succeed again when `None`.
    pub fn fail_opens(&self, reason: Option<&str>) {
        self.lock().fail_with = reason.map(str::to_string);
    }

    /// Every `open` call so far, with the time it happened and its URL.
    #[must_use]
    pub fn attempts(&self) -> Vec<(Instant, String)> {
        self.lock().attempts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MemoryConnector {
    fn open(&self, url: &str) -> Result<TransportLink, TransportError> {
        let fail_with = {
            let mut state = self.lock();
            state.attempts.push((Instant::now(), url.to_string()));
            state.fail_with.clone()
        };

        if let Some(reason) = fail_with {
            return Err(TransportError::OpenFailed(reason));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            url: url.to_string(),
            events: events_tx,
            outbound: outbound_rx,
        };
        if self.peers.send(peer).is_err() {
            return Err(TransportError::OpenFailed("listener dropped".to_string()));
        }

        Ok(TransportLink::new(outbound_tx, events_rx))
    }
}

/// Receives the remote side of each opened link.
#[derive(Debug)]
pub struct MemoryListener {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Waits for the next connection attempt.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// Returns a pending connection attempt, if any.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }
}

/// The remote end of one in-memory link.
#[derive(Debug)]
pub struct MemoryPeer {
    url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// URL the bridge opened.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Completes the connection.
    pub fn open(&self) -> bool {
        self.emit(TransportEvent::Opened)
    }

    /// Delivers a text frame to the bridge.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.emit(TransportEvent::Message(text.into()))
    }

    /// Reports a transport error.
    pub fn error(&self, message: impl Into<String>) -> bool {
        self.emit(TransportEvent::Error(message.into()))
    }

    /// Closes the connection from the remote side.
    pub fn close(&self) -> bool {
        self.emit(TransportEvent::Closed)
    }

    /// Whether the bridge has let go of this link.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.events.is_closed()
    }

    /// Waits for the next frame the bridge sent. `None` once the bridge drops the link.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Returns the next sent frame if one is queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }

    /// Drains every queued frame.
    pub fn drain(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (connector, mut listener) = MemoryConnector::new();
        let mut link = connector.open("mem://a").unwrap();
        let mut peer = listener.accept().await.unwrap();
        assert_eq!(peer.url(), "mem://a");

        peer.open();
        assert_eq!(link.next_event().await, TransportEvent::Opened);

        peer.send_text("hello");
        assert_eq!(
            link.next_event().await,
            TransportEvent::Message("hello".to_string())
        );

        assert!(link.send("reply".to_string()));
        assert_eq!(peer.recv().await.as_deref(), Some("reply"));
    }

    #[tokio::test]
    async fn dropping_link_is_visible_to_peer() {
        let (connector, mut listener) = MemoryConnector::new();
        let link = connector.open("mem://a").unwrap();
        let mut peer = listener.accept().await.unwrap();

        drop(link);
        assert!(peer.is_dropped());
        assert!(!peer.open());
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn forced_failures_are_recorded() {
        let (connector, mut listener) = MemoryConnector::new();
        connector.fail_opens(Some("refused"));

        let err = connector.open("mem://a").unwrap_err();
        assert_eq!(err, TransportError::OpenFailed("refused".to_string()));
        assert!(listener.try_accept().is_none());
        assert_eq!(connector.attempts().len(), 1);
    }
}
