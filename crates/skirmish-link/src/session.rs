//! PeerLink -- the connection manager.
//!
//! A single driver task owns every piece of mutable link state and
//! walks the state machine `Idle -> Hosting -> Connected ->
//! Reconnecting -> (Connected | Idle)`. The public handle talks to it
//! over a command channel, so subscriber callbacks and timer bodies are
//! serialized with respect to each other. Timers live inside the state
//! function that needs them and are dropped on every transition, so a
//! stale timer can never fire into a newer state.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use skirmish_protocol::{validate, Message};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::config::LinkConfig;
use crate::listeners::{ListenerSet, Subscription};
use crate::outbox::{OutboundQueue, RateWindow};
use crate::transport::{ConnEvent, Endpoint, LinkError, PeerAddr, PeerConn, Transport};

/// Connection role within a two-party session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts the inbound connection; authoritative side.
    Host,
    /// Dials the host; following side.
    Guest,
}

enum LinkCommand {
    Host {
        reply: oneshot::Sender<Result<PeerAddr, LinkError>>,
    },
    Join {
        addr: PeerAddr,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    Send {
        message: Message,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// Subscriber registries, shared between the handle and the driver.
struct Subscribers {
    data: ListenerSet<Message>,
    connected: ListenerSet<PeerAddr>,
    disconnected: ListenerSet<()>,
    peer_error: ListenerSet<LinkError>,
    server_disconnect: ListenerSet<LinkError>,
    reconnecting: ListenerSet<u32>,
    sync_request: ListenerSet<()>,
}

impl Subscribers {
    fn new() -> Self {
        Self {
            data: ListenerSet::new(),
            connected: ListenerSet::new(),
            disconnected: ListenerSet::new(),
            peer_error: ListenerSet::new(),
            server_disconnect: ListenerSet::new(),
            reconnecting: ListenerSet::new(),
            sync_request: ListenerSet::new(),
        }
    }

    fn clear_all(&self) {
        self.data.clear();
        self.connected.clear();
        self.disconnected.clear();
        self.peer_error.clear();
        self.server_disconnect.clear();
        self.reconnecting.clear();
        self.sync_request.clear();
    }
}

/// Handle to the link driver. Clone freely; one driver per link.
#[derive(Clone)]
pub struct PeerLink {
    cmd_tx: mpsc::Sender<LinkCommand>,
    subs: Arc<Subscribers>,
}

impl PeerLink {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, LinkConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: LinkConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let subs = Arc::new(Subscribers::new());

        let driver = Driver {
            rate: RateWindow::new(config.rate_limit_per_sec, Duration::from_secs(1)),
            outbox: OutboundQueue::new(config.outbox_capacity),
            transport,
            config,
            subs: subs.clone(),
            cmd_rx,
            role: None,
            remote_addr: None,
        };
        tokio::spawn(driver.run());

        Self { cmd_tx, subs }
    }

    /// Acquire a local endpoint and start accepting one inbound
    /// connection. Returns the transport-assigned address. Failures are
    /// also dispatched to peer-error subscribers.
    pub async fn host(&self) -> Result<PeerAddr, LinkError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(LinkCommand::Host { reply: tx })
            .await
            .map_err(|_| LinkError::Closed)?;
        rx.await.map_err(|_| LinkError::Closed)?
    }

    /// Acquire a local endpoint and dial `addr`. The address is
    /// retained for the life of the session so reconnects know where to
    /// redial; dial failures enter the reconnect sequence and surface
    /// through the subscriptions.
    pub async fn join(&self, addr: impl Into<PeerAddr>) -> Result<(), LinkError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(LinkCommand::Join {
                addr: addr.into(),
                reply: tx,
            })
            .await
            .map_err(|_| LinkError::Closed)?;
        rx.await.map_err(|_| LinkError::Closed)?
    }

    /// Submit a message. Sent immediately when connected (subject to
    /// the rate cap); buffered otherwise. Never fails from the caller's
    /// point of view.
    pub async fn send(&self, message: Message) {
        let _ = self.cmd_tx.send(LinkCommand::Send { message }).await;
    }

    /// Full teardown: connection, endpoint, buffered messages,
    /// subscriber lists, reconnect state. Idempotent.
    pub async fn disconnect(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(LinkCommand::Disconnect { reply: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Validated application messages (control traffic never appears
    /// here).
    pub fn on_data(&self, f: impl Fn(&Message) + Send + Sync + 'static) -> Subscription {
        self.subs.data.subscribe(f)
    }

    /// A connection opened; payload is the remote address.
    pub fn on_connect(&self, f: impl Fn(&PeerAddr) + Send + Sync + 'static) -> Subscription {
        self.subs.connected.subscribe(f)
    }

    /// The peer connection was lost.
    pub fn on_disconnect(&self, f: impl Fn(&()) + Send + Sync + 'static) -> Subscription {
        self.subs.disconnected.subscribe(f)
    }

    /// Transport and discovery errors. Only
    /// [`LinkError::ConnectionFailed`] is terminal.
    pub fn on_peer_error(&self, f: impl Fn(&LinkError) + Send + Sync + 'static) -> Subscription {
        self.subs.peer_error.subscribe(f)
    }

    /// The discovery service itself was lost, as distinct from the peer
    /// connection.
    pub fn on_server_disconnect(
        &self,
        f: impl Fn(&LinkError) + Send + Sync + 'static,
    ) -> Subscription {
        self.subs.server_disconnect.subscribe(f)
    }

    /// A reconnect sequence started; payload is the first attempt
    /// number.
    pub fn on_reconnecting(&self, f: impl Fn(&u32) + Send + Sync + 'static) -> Subscription {
        self.subs.reconnecting.subscribe(f)
    }

    /// The peer asked for a fresh authoritative snapshot.
    pub fn on_sync_request(&self, f: impl Fn(&()) + Send + Sync + 'static) -> Subscription {
        self.subs.sync_request.subscribe(f)
    }
}

// ============================================================================
// Driver
// ============================================================================

enum Step {
    Idle,
    Hosting { endpoint: Box<dyn Endpoint> },
    Connected { endpoint: Box<dyn Endpoint>, conn: PeerConn },
    Reconnecting { attempt: u32 },
    Stopped,
}

struct Driver {
    transport: Arc<dyn Transport>,
    config: LinkConfig,
    subs: Arc<Subscribers>,
    cmd_rx: mpsc::Receiver<LinkCommand>,
    outbox: OutboundQueue,
    rate: RateWindow,
    role: Option<Role>,
    remote_addr: Option<PeerAddr>,
}

impl Driver {
    async fn run(mut self) {
        let mut step = Step::Idle;
        loop {
            step = match step {
                Step::Idle => self.run_idle().await,
                Step::Hosting { endpoint } => self.run_hosting(endpoint).await,
                Step::Connected { endpoint, conn } => self.run_connected(endpoint, conn).await,
                Step::Reconnecting { attempt } => self.run_reconnecting(attempt).await,
                Step::Stopped => break,
            };
        }
        tracing::debug!("link: driver stopped");
    }

    // -- Idle ----------------------------------------------------------------

    async fn run_idle(&mut self) -> Step {
        loop {
            let Some(cmd) = self.cmd_rx.recv().await else {
                return Step::Stopped;
            };
            match cmd {
                LinkCommand::Host { reply } => match self.transport.acquire().await {
                    Ok(endpoint) => {
                        self.role = Some(Role::Host);
                        let addr = endpoint.local_addr();
                        tracing::info!(%addr, "link: hosting");
                        let _ = reply.send(Ok(addr));
                        return Step::Hosting { endpoint };
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "link: endpoint acquisition failed");
                        self.subs.peer_error.notify(&e);
                        let _ = reply.send(Err(e));
                    }
                },
                LinkCommand::Join { addr, reply } => match self.transport.acquire().await {
                    Ok(mut endpoint) => {
                        self.role = Some(Role::Guest);
                        self.remote_addr = Some(addr.clone());
                        let _ = reply.send(Ok(()));

                        match endpoint.connect(&addr).await {
                            Ok(conn) => match self.on_open(&conn).await {
                                Ok(()) => return Step::Connected { endpoint, conn },
                                Err(e) => {
                                    tracing::warn!(error = %e, "link: connection setup failed");
                                    self.subs.peer_error.notify(&e);
                                    return self.begin_reconnect(endpoint, None);
                                }
                            },
                            Err(e) => {
                                tracing::warn!(%addr, error = %e, "link: dial failed");
                                self.subs.peer_error.notify(&e);
                                return self.begin_reconnect(endpoint, None);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "link: endpoint acquisition failed");
                        self.subs.peer_error.notify(&e);
                        let _ = reply.send(Err(e));
                    }
                },
                LinkCommand::Send { message } => self.buffer_offline(message),
                LinkCommand::Disconnect { reply } => {
                    self.reset(true);
                    let _ = reply.send(());
                }
            }
        }
    }

    // -- Hosting (endpoint up, no connection yet) ----------------------------

    async fn run_hosting(&mut self, mut endpoint: Box<dyn Endpoint>) -> Step {
        loop {
            tokio::select! {
                inbound = endpoint.accept() => match inbound {
                    Ok(conn) => {
                        tracing::info!(remote = %conn.remote(), "link: peer connected");
                        match self.on_open(&conn).await {
                            Ok(()) => return Step::Connected { endpoint, conn },
                            Err(e) => {
                                tracing::warn!(error = %e, "link: connection setup failed");
                                self.subs.peer_error.notify(&e);
                                return self.begin_reconnect(endpoint, None);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "link: listening endpoint lost");
                        self.subs.server_disconnect.notify(&e);
                        self.subs.peer_error.notify(&e);
                        return self.begin_reconnect(endpoint, None);
                    }
                },
                cmd = self.cmd_rx.recv() => match cmd {
                    None => {
                        endpoint.close();
                        return Step::Stopped;
                    }
                    Some(LinkCommand::Send { message }) => self.buffer_offline(message),
                    Some(LinkCommand::Disconnect { reply }) => {
                        endpoint.close();
                        self.reset(true);
                        tracing::info!("link: disconnected");
                        let _ = reply.send(());
                        return Step::Idle;
                    }
                    Some(LinkCommand::Host { reply }) => {
                        // Re-hosting while already listening is a no-op.
                        let _ = reply.send(Ok(endpoint.local_addr()));
                    }
                    Some(LinkCommand::Join { reply, .. }) => {
                        let _ = reply.send(Err(LinkError::InvalidState("already hosting".into())));
                    }
                },
            }
        }
    }

    // -- Connected -----------------------------------------------------------

    async fn run_connected(&mut self, mut endpoint: Box<dyn Endpoint>, mut conn: PeerConn) -> Step {
        let role = self.role.unwrap_or(Role::Host);

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        heartbeat.tick().await;
        let mut resync = tokio::time::interval(self.config.resync_interval());
        resync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        resync.tick().await;

        let mut last_pong = Instant::now();

        loop {
            tokio::select! {
                event = conn.next_event() => match event {
                    ConnEvent::Frame(frame) => {
                        if let Err(e) = self.on_frame(&conn, frame, &mut last_pong).await {
                            tracing::warn!(error = %e, "link: reply failed");
                            self.subs.peer_error.notify(&e);
                            self.subs.disconnected.notify(&());
                            return self.begin_reconnect(endpoint, Some(conn));
                        }
                    }
                    ConnEvent::Closed => {
                        tracing::info!("link: peer connection closed");
                        self.subs.disconnected.notify(&());
                        return self.begin_reconnect(endpoint, Some(conn));
                    }
                    ConnEvent::Error(e) => {
                        tracing::warn!(error = %e, "link: connection error");
                        self.subs.peer_error.notify(&LinkError::Transport(e));
                        self.subs.disconnected.notify(&());
                        return self.begin_reconnect(endpoint, Some(conn));
                    }
                },
                // A second inbound connection must not displace the first.
                inbound = endpoint.accept(), if role == Role::Host => match inbound {
                    Ok(extra) => {
                        tracing::warn!(
                            remote = %extra.remote(),
                            "link: rejecting superseding inbound connection"
                        );
                        extra.close();
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "link: listening endpoint lost");
                        self.subs.server_disconnect.notify(&e);
                        self.subs.disconnected.notify(&());
                        return self.begin_reconnect(endpoint, Some(conn));
                    }
                },
                _ = heartbeat.tick(), if role == Role::Host => {
                    if last_pong.elapsed() > self.config.pong_timeout() {
                        tracing::warn!("link: pong timeout, connection stale");
                        self.subs.disconnected.notify(&());
                        return self.begin_reconnect(endpoint, Some(conn));
                    }
                    if let Err(e) = self.send_control(&conn, Message::Ping).await {
                        self.subs.peer_error.notify(&e);
                        self.subs.disconnected.notify(&());
                        return self.begin_reconnect(endpoint, Some(conn));
                    }
                },
                _ = resync.tick(), if role == Role::Guest => {
                    if let Err(e) = self.send_control(&conn, Message::RequestSync).await {
                        self.subs.peer_error.notify(&e);
                        self.subs.disconnected.notify(&());
                        return self.begin_reconnect(endpoint, Some(conn));
                    }
                },
                cmd = self.cmd_rx.recv() => match cmd {
                    None => {
                        conn.close();
                        endpoint.close();
                        return Step::Stopped;
                    }
                    Some(LinkCommand::Send { message }) => {
                        if let Err(e) = self.transmit(&conn, message).await {
                            tracing::warn!(error = %e, "link: send failed");
                            self.subs.peer_error.notify(&e);
                            self.subs.disconnected.notify(&());
                            return self.begin_reconnect(endpoint, Some(conn));
                        }
                    }
                    Some(LinkCommand::Disconnect { reply }) => {
                        conn.close();
                        endpoint.close();
                        self.reset(true);
                        tracing::info!("link: disconnected");
                        let _ = reply.send(());
                        return Step::Idle;
                    }
                    Some(LinkCommand::Host { reply }) => {
                        let _ = reply.send(Err(LinkError::InvalidState("session active".into())));
                    }
                    Some(LinkCommand::Join { reply, .. }) => {
                        let _ = reply.send(Err(LinkError::InvalidState("session active".into())));
                    }
                },
            }
        }
    }

    // -- Reconnecting --------------------------------------------------------

    async fn run_reconnecting(&mut self, attempt: u32) -> Step {
        let delay = self.config.backoff_delay(attempt);
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "link: scheduling redial"
        );

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => break,
                cmd = self.cmd_rx.recv() => match cmd {
                    None => return Step::Stopped,
                    Some(LinkCommand::Send { message }) => self.buffer_offline(message),
                    Some(LinkCommand::Disconnect { reply }) => {
                        self.reset(true);
                        tracing::info!("link: disconnected");
                        let _ = reply.send(());
                        return Step::Idle;
                    }
                    Some(LinkCommand::Host { reply }) => {
                        let _ = reply
                            .send(Err(LinkError::InvalidState("reconnect in progress".into())));
                    }
                    Some(LinkCommand::Join { reply, .. }) => {
                        let _ = reply
                            .send(Err(LinkError::InvalidState("reconnect in progress".into())));
                    }
                },
            }
        }

        match self.redial().await {
            Ok(step) => step,
            Err(e) if attempt >= self.config.max_reconnect_attempts => {
                tracing::error!(error = %e, attempts = attempt, "link: reconnect attempts exhausted");
                self.subs
                    .peer_error
                    .notify(&LinkError::ConnectionFailed { attempts: attempt });
                self.reset(false);
                Step::Idle
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "link: redial failed");
                self.subs.peer_error.notify(&e);
                Step::Reconnecting {
                    attempt: attempt + 1,
                }
            }
        }
    }

    async fn redial(&mut self) -> Result<Step, LinkError> {
        let mut endpoint = self.transport.acquire().await?;

        match self.role {
            Some(Role::Guest) => {
                let addr = self
                    .remote_addr
                    .clone()
                    .ok_or_else(|| LinkError::Dial("no remote address retained".into()))?;
                let conn = endpoint.connect(&addr).await?;
                self.on_open(&conn).await?;
                tracing::info!(remote = %conn.remote(), "link: reconnected");
                Ok(Step::Connected { endpoint, conn })
            }
            _ => {
                // Hosts resume listening; the counter resets now, and
                // connected subscribers fire when a peer redials us.
                tracing::info!(
                    addr = %endpoint.local_addr(),
                    "link: endpoint re-acquired, awaiting peer"
                );
                Ok(Step::Hosting { endpoint })
            }
        }
    }

    /// Tear down the active endpoint/connection and enter the backoff
    /// sequence. Re-entry is impossible by construction: the driver is
    /// in exactly one state.
    fn begin_reconnect(&mut self, mut endpoint: Box<dyn Endpoint>, conn: Option<PeerConn>) -> Step {
        if let Some(conn) = conn {
            conn.close();
        }
        endpoint.close();
        drop(endpoint);

        self.subs.reconnecting.notify(&1);
        Step::Reconnecting { attempt: 1 }
    }

    // -- Shared paths --------------------------------------------------------

    /// A connection opened: flush the buffer in FIFO order, notify
    /// subscribers, and kick off role-specific behavior.
    async fn on_open(&mut self, conn: &PeerConn) -> Result<(), LinkError> {
        let queued = self.outbox.drain();
        if !queued.is_empty() {
            tracing::info!(count = queued.len(), "link: flushing buffered messages");
        }
        for message in queued {
            let frame = encode(&message)?;
            conn.send(frame).await?;
        }

        self.subs.connected.notify(conn.remote());

        if self.role == Some(Role::Guest) {
            self.send_control(conn, Message::RequestSync).await?;
        }
        Ok(())
    }

    /// Validate, decode, and dispatch one inbound frame. Control
    /// messages are handled here and never reach data subscribers.
    async fn on_frame(
        &mut self,
        conn: &PeerConn,
        frame: Value,
        last_pong: &mut Instant,
    ) -> Result<(), LinkError> {
        if !validate::is_valid_message(&frame) {
            tracing::warn!("link: dropping invalid message from peer");
            return Ok(());
        }
        let message: Message = match serde_json::from_value(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "link: dropping undecodable message");
                return Ok(());
            }
        };

        match message {
            Message::Ping => self.send_control(conn, Message::Pong).await?,
            Message::Pong => *last_pong = Instant::now(),
            Message::RequestSync => self.subs.sync_request.notify(&()),
            other => self.subs.data.notify(&other),
        }
        Ok(())
    }

    /// Rate-gate and transmit a locally submitted message.
    async fn transmit(&mut self, conn: &PeerConn, message: Message) -> Result<(), LinkError> {
        if !self.rate.admit(Instant::now()) {
            tracing::debug!(tag = message.tag(), "link: rate limit exceeded, message dropped");
            return Ok(());
        }
        let frame = encode(&message)?;
        self.warn_if_large(&frame, message.tag());
        conn.send(frame).await
    }

    /// Internal control traffic; not counted against the caller's rate
    /// budget.
    async fn send_control(&self, conn: &PeerConn, message: Message) -> Result<(), LinkError> {
        conn.send(encode(&message)?).await
    }

    /// Buffer a message submitted while no connection is open.
    fn buffer_offline(&mut self, message: Message) {
        let tag = message.tag();
        if let Ok(frame) = serde_json::to_value(&message) {
            self.warn_if_large(&frame, tag);
        }
        if let Some(evicted) = self.outbox.push(message) {
            tracing::debug!(
                tag = evicted.tag(),
                "link: outbox full, dropped oldest message"
            );
        }
    }

    fn warn_if_large(&self, frame: &Value, tag: &str) {
        let size = frame.to_string().len();
        if size > self.config.large_payload_bytes {
            tracing::warn!(tag, bytes = size, "link: large outbound payload");
        }
    }

    /// Reset to the idle state. Explicit disconnects also clear the
    /// subscriber lists; reconnect exhaustion keeps them so the
    /// application still hears about the session it lost.
    fn reset(&mut self, clear_subscribers: bool) {
        self.outbox.clear();
        self.rate = RateWindow::new(self.config.rate_limit_per_sec, Duration::from_secs(1));
        self.role = None;
        self.remote_addr = None;
        if clear_subscribers {
            self.subs.clear_all();
        }
    }
}

fn encode(message: &Message) -> Result<Value, LinkError> {
    serde_json::to_value(message).map_err(|e| LinkError::Transport(e.to_string()))
}
