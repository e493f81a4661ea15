//! QUIC transport -- quinn endpoints bridged onto [`PeerConn`] channels.
//!
//! One bidirectional stream per connection. The guest opens the stream;
//! the host's accept completes once the guest's first frame arrives
//! (the link layer sends `REQUEST_SYNC` on open, so this is immediate
//! in practice). Frames go through [`FrameCodec`].

use std::net::SocketAddr;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use skirmish_protocol::{tls, FrameCodec};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::transport::{ConnEvent, Endpoint, LinkError, PeerAddr, PeerConn, Transport};

const CONN_BUFFER: usize = 32;

/// Server name presented when dialling (certificates are not verified).
const SERVER_NAME: &str = "skirmish.local";

/// QUIC transport bound to a local socket address.
pub struct QuicTransport {
    listen_addr: SocketAddr,
}

impl QuicTransport {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self { listen_addr }
    }
}

impl Transport for QuicTransport {
    fn acquire(&self) -> BoxFuture<'_, Result<Box<dyn Endpoint>, LinkError>> {
        Box::pin(async move {
            let (cert_der, key_der) =
                tls::generate_self_signed().map_err(|e| LinkError::Discovery(e.to_string()))?;
            let server_config = tls::build_server_config(cert_der, key_der)
                .map_err(|e| LinkError::Discovery(e.to_string()))?;
            let client_config =
                tls::build_client_config().map_err(|e| LinkError::Discovery(e.to_string()))?;

            let endpoint = quinn::Endpoint::server(server_config, self.listen_addr)
                .map_err(|e| LinkError::Discovery(e.to_string()))?;
            let local = endpoint
                .local_addr()
                .map_err(|e| LinkError::Discovery(e.to_string()))?;

            tracing::debug!(addr = %local, "link: quic endpoint acquired");

            Ok(Box::new(QuicEndpoint {
                endpoint,
                client_config,
                local: local.to_string(),
            }) as Box<dyn Endpoint>)
        })
    }
}

struct QuicEndpoint {
    endpoint: quinn::Endpoint,
    client_config: quinn::ClientConfig,
    local: PeerAddr,
}

impl Endpoint for QuicEndpoint {
    fn local_addr(&self) -> PeerAddr {
        self.local.clone()
    }

    fn accept(&mut self) -> BoxFuture<'_, Result<PeerConn, LinkError>> {
        Box::pin(async move {
            let incoming = self
                .endpoint
                .accept()
                .await
                .ok_or_else(|| LinkError::Discovery("endpoint closed".into()))?;
            let conn = incoming
                .await
                .map_err(|e| LinkError::Transport(e.to_string()))?;
            let (send, recv) = conn
                .accept_bi()
                .await
                .map_err(|e| LinkError::Transport(e.to_string()))?;

            tracing::debug!(remote = %conn.remote_address(), "link: accepted quic connection");
            Ok(bridge(conn, send, recv))
        })
    }

    fn connect<'a>(&'a mut self, addr: &'a PeerAddr) -> BoxFuture<'a, Result<PeerConn, LinkError>> {
        Box::pin(async move {
            let remote: SocketAddr = addr
                .parse()
                .map_err(|e| LinkError::Dial(format!("bad address {addr}: {e}")))?;

            let conn = self
                .endpoint
                .connect_with(self.client_config.clone(), remote, SERVER_NAME)
                .map_err(|e| LinkError::Dial(e.to_string()))?
                .await
                .map_err(|e| LinkError::Dial(e.to_string()))?;
            let (send, recv) = conn
                .open_bi()
                .await
                .map_err(|e| LinkError::Dial(e.to_string()))?;

            tracing::debug!(remote = %conn.remote_address(), "link: dialled quic connection");
            Ok(bridge(conn, send, recv))
        })
    }

    fn close(&mut self) {
        self.endpoint.close(0u32.into(), b"link closed");
    }
}

/// Spawn reader/writer tasks bridging a QUIC stream pair onto PeerConn
/// channels.
fn bridge(
    conn: quinn::Connection,
    send: quinn::SendStream,
    recv: quinn::RecvStream,
) -> PeerConn {
    let remote = conn.remote_address().to_string();
    let (out_tx, mut out_rx) = mpsc::channel::<Value>(CONN_BUFFER);
    let (ev_tx, ev_rx) = mpsc::channel::<ConnEvent>(CONN_BUFFER);

    // Writer: outbound frames -> stream. Dropping the PeerConn closes
    // out_rx, which finishes the stream and releases the connection.
    let writer_conn = conn.clone();
    tokio::spawn(async move {
        let mut writer = FramedWrite::new(send, FrameCodec);
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = writer.send(frame).await {
                tracing::debug!(error = %e, "link: quic write failed");
                break;
            }
        }
        let _ = writer.into_inner().finish();
        writer_conn.close(0u32.into(), b"closed");
    });

    // Reader: stream -> events.
    tokio::spawn(async move {
        let mut reader = FramedRead::new(recv, FrameCodec);
        loop {
            match reader.next().await {
                Some(Ok(frame)) => {
                    if ev_tx.send(ConnEvent::Frame(frame)).await.is_err() {
                        return;
                    }
                }
                Some(Err(e)) => {
                    let _ = ev_tx.send(ConnEvent::Error(e.to_string())).await;
                    return;
                }
                None => {
                    let _ = ev_tx.send(ConnEvent::Closed).await;
                    return;
                }
            }
        }
    });

    PeerConn::new(out_tx, ev_rx, remote)
}
