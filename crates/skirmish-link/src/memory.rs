//! In-memory transport -- channel-backed peer links for tests and
//! same-process sessions.
//!
//! [`MemoryNet`] plays the discovery service: it hands out addresses
//! and routes dials to registered listeners. [`FlakyTransport`] wraps
//! any transport to inject acquisition failures for reconnect tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::transport::{ConnEvent, Endpoint, LinkError, PeerAddr, PeerConn, Transport};

const CONN_BUFFER: usize = 32;

struct NetInner {
    listeners: HashMap<PeerAddr, mpsc::Sender<PeerConn>>,
    open: bool,
}

/// An in-process discovery registry shared by every transport handle
/// cloned from it.
#[derive(Clone)]
pub struct MemoryNet {
    inner: Arc<Mutex<NetInner>>,
}

impl Default for MemoryNet {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNet {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(NetInner {
                listeners: HashMap::new(),
                open: true,
            })),
        }
    }

    /// A transport that gets a fresh random address per acquisition.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            inner: self.inner.clone(),
            pinned: None,
        }
    }

    /// A transport that re-acquires the same address every time, the
    /// way a broker re-issues a stable peer id across reconnects.
    pub fn named_transport(&self, addr: impl Into<PeerAddr>) -> MemoryTransport {
        MemoryTransport {
            inner: self.inner.clone(),
            pinned: Some(addr.into()),
        }
    }

    /// Simulate losing the discovery service: pending and future
    /// acquisitions fail, registered listeners are dropped.
    pub fn shut_down(&self) {
        let mut inner = self.inner.lock().expect("memory net poisoned");
        inner.open = false;
        inner.listeners.clear();
    }
}

/// Transport handle over a [`MemoryNet`].
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Mutex<NetInner>>,
    pinned: Option<PeerAddr>,
}

impl Transport for MemoryTransport {
    fn acquire(&self) -> BoxFuture<'_, Result<Box<dyn Endpoint>, LinkError>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("memory net poisoned");
            if !inner.open {
                return Err(LinkError::Discovery("registry closed".into()));
            }

            let addr = match &self.pinned {
                Some(addr) => addr.clone(),
                None => loop {
                    let candidate = format!("mem-{:06x}", rand::random::<u32>() & 0xff_ffff);
                    if !inner.listeners.contains_key(&candidate) {
                        break candidate;
                    }
                },
            };

            let (listen_tx, listen_rx) = mpsc::channel(4);
            inner.listeners.insert(addr.clone(), listen_tx.clone());

            Ok(Box::new(MemoryEndpoint {
                addr,
                listen_tx,
                incoming: listen_rx,
                net: self.inner.clone(),
            }) as Box<dyn Endpoint>)
        })
    }
}

struct MemoryEndpoint {
    addr: PeerAddr,
    listen_tx: mpsc::Sender<PeerConn>,
    incoming: mpsc::Receiver<PeerConn>,
    net: Arc<Mutex<NetInner>>,
}

impl Endpoint for MemoryEndpoint {
    fn local_addr(&self) -> PeerAddr {
        self.addr.clone()
    }

    fn accept(&mut self) -> BoxFuture<'_, Result<PeerConn, LinkError>> {
        Box::pin(async move {
            self.incoming
                .recv()
                .await
                .ok_or_else(|| LinkError::Discovery("registry closed".into()))
        })
    }

    fn connect<'a>(&'a mut self, addr: &'a PeerAddr) -> BoxFuture<'a, Result<PeerConn, LinkError>> {
        Box::pin(async move {
            let listener = {
                let inner = self.net.lock().expect("memory net poisoned");
                if !inner.open {
                    return Err(LinkError::Discovery("registry closed".into()));
                }
                inner
                    .listeners
                    .get(addr)
                    .cloned()
                    .ok_or_else(|| LinkError::Dial(format!("no endpoint at {addr}")))?
            };

            let (local, remote) = conn_pair(self.addr.clone(), addr.clone());
            listener
                .send(remote)
                .await
                .map_err(|_| LinkError::Dial(format!("endpoint at {addr} is gone")))?;
            Ok(local)
        })
    }

    fn close(&mut self) {
        // Only deregister our own registration; a newer endpoint may
        // have re-acquired the same pinned address already.
        let mut inner = self.net.lock().expect("memory net poisoned");
        if inner
            .listeners
            .get(&self.addr)
            .is_some_and(|tx| tx.same_channel(&self.listen_tx))
        {
            inner.listeners.remove(&self.addr);
        }
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

/// Build both halves of a connection, bridged by pump tasks.
fn conn_pair(dialer_addr: PeerAddr, listener_addr: PeerAddr) -> (PeerConn, PeerConn) {
    let (a_out_tx, a_out_rx) = mpsc::channel(CONN_BUFFER);
    let (a_ev_tx, a_ev_rx) = mpsc::channel(CONN_BUFFER);
    let (b_out_tx, b_out_rx) = mpsc::channel(CONN_BUFFER);
    let (b_ev_tx, b_ev_rx) = mpsc::channel(CONN_BUFFER);

    pump(a_out_rx, b_ev_tx);
    pump(b_out_rx, a_ev_tx);

    let dialer_side = PeerConn::new(a_out_tx, a_ev_rx, listener_addr);
    let listener_side = PeerConn::new(b_out_tx, b_ev_rx, dialer_addr);
    (dialer_side, listener_side)
}

/// Forward frames from one side's write half to the other side's read
/// half; a dropped writer reads as a close.
fn pump(mut frames: mpsc::Receiver<Value>, events: mpsc::Sender<ConnEvent>) {
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if events.send(ConnEvent::Frame(frame)).await.is_err() {
                return;
            }
        }
        let _ = events.send(ConnEvent::Closed).await;
    });
}

/// Transport wrapper that fails the first `failures` acquisitions.
pub struct FlakyTransport<T> {
    inner: T,
    failures: AtomicU32,
}

impl<T: Transport> FlakyTransport<T> {
    pub fn new(inner: T, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
        }
    }
}

impl<T: Transport> Transport for FlakyTransport<T> {
    fn acquire(&self) -> BoxFuture<'_, Result<Box<dyn Endpoint>, LinkError>> {
        Box::pin(async move {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(LinkError::Discovery("injected acquisition failure".into()));
            }
            self.inner.acquire().await
        })
    }
}
