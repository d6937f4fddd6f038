//! WebSocket client transport.
//!
//! Each link is driven by one spawned task that owns the socket:
//!
//! - frames queued on the link are written as WebSocket text messages
//! - inbound text messages become [`TransportEvent::Message`]
//! - binary frames are ignored; protocol pings are answered by tungstenite
//! - dropping the link sends a close frame and ends the task
//! - a handshake that does not finish within the connect timeout reports an
//!   error and closes

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, trace};

use crate::error::TransportError;
use crate::mcp::transport::{Connector, TransportEvent, TransportLink};

/// Default limit for the TCP connect plus WebSocket upgrade.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens WebSocket connections with tokio-tungstenite.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Creates a connector with [`DEFAULT_CONNECT_TIMEOUT`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets how long the handshake may take before the attempt is abandoned.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The handshake limit.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, url: &str) -> Result<TransportLink, TransportError> {
        let request = url
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(pump(request, self.connect_timeout, outbound_rx, events_tx));

        Ok(TransportLink::new(outbound_tx, events_rx))
    }
}

/// Connects, then shuttles frames until either side goes away.
async fn pump(
    request: Request,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let uri = request.uri().to_string();

    let connected = tokio::select! {
        result = tokio::time::timeout(connect_timeout, connect_async(request)) => result,
        () = events.closed() => {
            debug!(uri = %uri, "Link dropped while connecting");
            return;
        }
    };

    let outcome = match connected {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(format!("WebSocket connection to {uri} failed: {e}")),
        Err(_) => Err(format!(
            "WebSocket connection to {uri} timed out after {connect_timeout:?}"
        )),
    };
    let stream = match outcome {
        Ok(stream) => stream,
        Err(message) => {
            let _ = events.send(TransportEvent::Error(message));
            let _ = events.send(TransportEvent::Closed);
            return;
        }
    };

    debug!(uri = %uri, "WebSocket connected");
    let _ = events.send(TransportEvent::Opened);

    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(text) = frame else {
                    debug!(uri = %uri, "Link dropped, closing WebSocket");
                    let _ = sink.close().await;
                    return;
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    let _ = events.send(TransportEvent::Error(format!("WebSocket send failed: {e}")));
                    break;
                }
            }

            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(uri = %uri, frame = ?frame, "WebSocket closed by peer");
                    break;
                }
                Some(Ok(other)) => {
                    trace!(uri = %uri, message = ?other, "Ignoring non-text WebSocket message");
                }
                Some(Err(e)) => {
                    let _ = events.send(TransportEvent::Error(format!("WebSocket error: {e}")));
                    break;
                }
                None => break,
            }
        }
    }

    let _ = events.send(TransportEvent::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_url_fails_synchronously() {
        let err = WebSocketConnector::new().open("not a url").unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint { .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_error_then_close() {
        // Port 9 (discard) on loopback is essentially never listening.
        let mut link = WebSocketConnector::new()
            .open("ws://127.0.0.1:9/instance")
            .unwrap();

        let TransportEvent::Error(message) = link.next_event().await else {
            panic!("Expected Error event");
        };
        assert!(message.contains("127.0.0.1:9"));
        assert_eq!(link.next_event().await, TransportEvent::Closed);
    }

    #[tokio::test]
    async fn silent_endpoint_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // Accept and hold the socket without ever answering the upgrade.
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let mut link = WebSocketConnector::new()
            .with_connect_timeout(Duration::from_millis(200))
            .open(&format!("ws://{addr}/silent"))
            .unwrap();

        let TransportEvent::Error(message) = link.next_event().await else {
            panic!("Expected Error event");
        };
        assert!(message.contains("timed out"), "unexpected message {message}");
        assert_eq!(link.next_event().await, TransportEvent::Closed);

        server.abort();
    }
}
