//! Transport abstraction -- the seam between the connection manager and
//! whatever actually moves bytes.
//!
//! Implementations bridge their native I/O onto [`PeerConn`] channels
//! from spawned reader/writer tasks, so the driver only ever deals with
//! frames and events.

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;

/// Transport-assigned address of an endpoint.
pub type PeerAddr = String;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LinkError {
    /// The discovery layer could not provide or keep an endpoint.
    #[error("discovery service unavailable: {0}")]
    Discovery(String),
    /// An outbound dial was refused or could not complete.
    #[error("dial failed: {0}")]
    Dial(String),
    /// An established connection failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// Terminal: the reconnect sequence exhausted its attempt budget.
    #[error("connection failed after {attempts} reconnect attempts")]
    ConnectionFailed { attempts: u32 },
    /// The operation is not valid in the link's current state.
    #[error("invalid operation: {0}")]
    InvalidState(String),
    /// The link driver has shut down.
    #[error("link is closed")]
    Closed,
}

/// Events surfaced by a connection's read side.
#[derive(Debug)]
pub enum ConnEvent {
    /// A decoded inbound frame.
    Frame(Value),
    /// The peer closed the connection.
    Closed,
    /// The connection failed.
    Error(String),
}

/// A single logical channel to the remote endpoint.
pub struct PeerConn {
    outbound: mpsc::Sender<Value>,
    events: mpsc::Receiver<ConnEvent>,
    remote: PeerAddr,
}

impl PeerConn {
    pub fn new(
        outbound: mpsc::Sender<Value>,
        events: mpsc::Receiver<ConnEvent>,
        remote: PeerAddr,
    ) -> Self {
        Self {
            outbound,
            events,
            remote,
        }
    }

    /// Address of the remote endpoint.
    pub fn remote(&self) -> &PeerAddr {
        &self.remote
    }

    /// Hand a frame to the transport's write side.
    pub async fn send(&self, frame: Value) -> Result<(), LinkError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| LinkError::Transport("connection writer gone".into()))
    }

    /// Next event from the read side. A dropped transport reads as
    /// [`ConnEvent::Closed`].
    pub async fn next_event(&mut self) -> ConnEvent {
        self.events.recv().await.unwrap_or(ConnEvent::Closed)
    }

    /// Close the connection. Dropping the write half signals the
    /// transport's bridging tasks to tear down.
    pub fn close(self) {
        drop(self);
    }
}

/// A peer transport's discovery layer: hands out endpoints.
pub trait Transport: Send + Sync + 'static {
    /// Acquire a local endpoint with a transport-assigned address.
    fn acquire(&self) -> BoxFuture<'_, Result<Box<dyn Endpoint>, LinkError>>;
}

/// A local endpoint: listens for inbound connections and dials out.
pub trait Endpoint: Send {
    /// The address assigned to this endpoint.
    fn local_addr(&self) -> PeerAddr;

    /// Wait for the next inbound connection.
    fn accept(&mut self) -> BoxFuture<'_, Result<PeerConn, LinkError>>;

    /// Dial a remote endpoint.
    fn connect<'a>(&'a mut self, addr: &'a PeerAddr) -> BoxFuture<'a, Result<PeerConn, LinkError>>;

    /// Release the endpoint's address registration.
    fn close(&mut self);
}
