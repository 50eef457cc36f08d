//! TCP server implementation.
//!
//! One task runs the accept loop; every accepted connection gets its own
//! task owning the socket. Cross-connection traffic (forwarded requests and
//! relayed replies) travels through per-connection outbound queues, so each
//! socket is only ever written from its own task and frames never interleave.

use crate::error::ServerError;
use crate::registry::{ConnectionId, Registry};
use crate::session::{Session, SessionState};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use wirebus_protocol::{frame, Decoder, ErrorCode, Kind, Message, Payload};

/// Capacity of each connection's outbound queue. A full queue applies
/// backpressure to the connections forwarding into it.
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(
                std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                wirebus_protocol::DEFAULT_PORT,
            ),
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP server for the bus.
pub struct Server {
    config: ServerConfig,
    registry: Arc<Registry>,
    listener: Mutex<Option<TcpListener>>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    next_connection_id: AtomicU64,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server. Nothing is bound until [`Server::bind`] or
    /// [`Server::run`].
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            registry: Arc::new(Registry::new()),
            listener: Mutex::new(None),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            next_connection_id: AtomicU64::new(1),
            running: AtomicBool::new(false),
        }
    }

    /// Binds the listening socket and returns the bound address.
    ///
    /// Fails with [`ServerError::Bind`] (address in use, permission denied)
    /// leaving no partial state. Idempotent until [`Server::run`] consumes
    /// the listener. Useful with a port of 0 to learn the assigned port.
    pub async fn bind(&self) -> Result<SocketAddr, ServerError> {
        let mut guard = self.listener.lock().await;
        if let Some(listener) = guard.as_ref() {
            return Ok(listener.local_addr()?);
        }
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.bind_addr,
                source,
            })?;
        let addr = listener.local_addr()?;
        *guard = Some(listener);
        Ok(addr)
    }

    /// Runs the accept loop until [`Server::shutdown`] is called.
    pub async fn run(&self) -> Result<(), ServerError> {
        self.bind().await?;
        let listener = match self.listener.lock().await.take() {
            Some(listener) => listener,
            None => return Err(ServerError::ShuttingDown),
        };

        self.running.store(true, Ordering::SeqCst);
        tracing::info!("server listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.accept(stream, addr),
                        Err(e) => {
                            tracing::error!("accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("server shutting down");
                    break;
                }
            }
        }

        // Dropping the listener releases the socket; connection tasks hold
        // their own shutdown receivers and wind down on the same signal.
        drop(listener);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        if self.registry.connection_count() >= self.config.max_connections {
            tracing::warn!("connection limit reached, rejecting {}", addr);
            return;
        }

        stream.set_nodelay(true).ok();

        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        self.registry.add_connection(connection_id, outbound_tx);

        let registry = self.registry.clone();
        let stats = self.stats.clone();
        let mut conn_shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let result = Self::handle_connection(
                stream,
                addr,
                connection_id,
                outbound_rx,
                registry,
                stats.clone(),
                &mut conn_shutdown,
            )
            .await;

            match result {
                Ok(()) | Err(ServerError::ShuttingDown) => {}
                Err(e) => {
                    tracing::debug!("[{}] connection {} error: {}", connection_id, addr, e);
                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                }
            }

            stats.connections_active.fetch_sub(1, Ordering::Relaxed);
        });
    }

    /// Handles a single connection: reads and dispatches inbound frames,
    /// drains the outbound queue, and cleans up dispatch state on exit.
    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        connection_id: ConnectionId,
        mut outbound: mpsc::Receiver<Message>,
        registry: Arc<Registry>,
        stats: Arc<ServerStats>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let mut session = Session::new(addr, connection_id);
        tracing::info!(
            "[{}] client connected: {} (session {})",
            connection_id,
            addr,
            session.id
        );

        let mut decoder = Decoder::new();
        let mut buf = [0u8; 8192];

        let result = 'conn: loop {
            tokio::select! {
                biased;

                // Traffic relayed from other connections.
                maybe = outbound.recv() => {
                    let Some(msg) = maybe else { break 'conn Ok(()) };
                    let bytes = match frame::encode(&msg) {
                        Ok(bytes) => bytes,
                        Err(e) => break 'conn Err(e.into()),
                    };
                    if let Err(e) = stream.write_all(&bytes).await {
                        break 'conn Err(e.into());
                    }
                }

                // Inbound data from this connection's peer.
                result = stream.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            tracing::debug!("[{}] connection closed by peer", connection_id);
                            break 'conn Ok(());
                        }
                        Ok(n) => decoder.extend(&buf[..n]),
                        Err(e) => break 'conn Err(e.into()),
                    }

                    loop {
                        match decoder.next_message() {
                            Ok(Some(msg)) => {
                                if let Err(e) =
                                    Self::dispatch(&mut stream, &mut session, &registry, &stats, msg)
                                        .await
                                {
                                    break 'conn Err(e);
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                tracing::warn!("[{}] protocol error: {}", connection_id, e);
                                break 'conn Err(e.into());
                            }
                        }
                    }
                }

                _ = shutdown.recv() => {
                    tracing::debug!("[{}] shutdown signal received", connection_id);
                    break 'conn Err(ServerError::ShuttingDown);
                }
            }
        };

        session.set_state(SessionState::Closing);

        // Methods owned by this connection vanish with it; callers still
        // waiting on it must be failed rather than left to hang.
        let to_fail = registry.remove_connection(connection_id);
        for route in to_fail {
            let reply = Message::error(
                route.caller_request_id,
                ErrorCode::ConnectionClosed,
                "method owner disconnected",
            );
            if let Some(tx) = registry.sender(route.caller) {
                let _ = tx.send(reply).await;
            }
        }

        session.set_state(SessionState::Closed);
        tracing::info!(
            "[{}] client disconnected: {} ({} requests, {} methods, alive {:?})",
            connection_id,
            addr,
            session.request_count(),
            session.registered_methods().len(),
            session.age()
        );

        result
    }

    /// Routes one inbound frame.
    async fn dispatch(
        stream: &mut TcpStream,
        session: &mut Session,
        registry: &Registry,
        stats: &ServerStats,
        msg: Message,
    ) -> Result<(), ServerError> {
        match msg.kind {
            Kind::Register => {
                if msg.method.is_empty() {
                    let reply =
                        Message::error(msg.request_id, ErrorCode::BadRequest, "empty method name");
                    return Self::write_message(stream, &reply).await;
                }

                session.record_registration(&msg.method);
                let previous = registry.register_method(msg.method.clone(), session.connection_id);
                match previous {
                    Some(owner) if owner != session.connection_id => {
                        tracing::warn!(
                            "[{}] method '{}' re-registered, was owned by connection {}",
                            session.connection_id,
                            msg.method,
                            owner
                        );
                    }
                    _ => {
                        tracing::info!(
                            "[{}] registered method '{}'",
                            session.connection_id,
                            msg.method
                        );
                    }
                }

                let ack = Message::response(msg.request_id, Payload::new());
                Self::write_message(stream, &ack).await
            }

            Kind::Request => {
                session.record_request();
                stats.requests_total.fetch_add(1, Ordering::Relaxed);

                let Some(owner) = registry.lookup_method(&msg.method) else {
                    tracing::debug!(
                        "[{}] request for unknown method '{}'",
                        session.connection_id,
                        msg.method
                    );
                    let reply = Message::error(
                        msg.request_id,
                        ErrorCode::MethodNotFound,
                        format!("no handler registered for '{}'", msg.method),
                    );
                    return Self::write_message(stream, &reply).await;
                };

                // Forward under a server-assigned correlation id so the reply
                // routes back here even if another caller uses the same
                // request_id.
                let correlation_id =
                    registry.begin_route(session.connection_id, msg.request_id, owner);
                let caller_request_id = msg.request_id;
                let forwarded = Message::request(correlation_id, msg.method, msg.payload);

                let delivered = match registry.sender(owner) {
                    Some(tx) => tx.send(forwarded).await.is_ok(),
                    None => false,
                };
                if !delivered {
                    registry.finish_route(correlation_id);
                    let reply = Message::error(
                        caller_request_id,
                        ErrorCode::ConnectionClosed,
                        "method owner disconnected",
                    );
                    return Self::write_message(stream, &reply).await;
                }
                Ok(())
            }

            Kind::Response | Kind::Error => {
                let Some(route) = registry.finish_route(msg.request_id) else {
                    // Caller disconnected or this is a duplicate reply.
                    tracing::debug!(
                        "[{}] reply {} has no live route, discarding",
                        session.connection_id,
                        msg.request_id
                    );
                    return Ok(());
                };

                let mut relayed = msg;
                relayed.request_id = route.caller_request_id;

                match registry.sender(route.caller) {
                    Some(tx) => {
                        if tx.send(relayed).await.is_err() {
                            tracing::debug!(
                                "[{}] caller {} gone, dropping reply",
                                session.connection_id,
                                route.caller
                            );
                        }
                    }
                    None => {
                        tracing::debug!(
                            "[{}] caller {} gone, dropping reply",
                            session.connection_id,
                            route.caller
                        );
                    }
                }
                Ok(())
            }
        }
    }

    async fn write_message(stream: &mut TcpStream, msg: &Message) -> Result<(), ServerError> {
        let bytes = frame::encode(msg)?;
        stream.write_all(&bytes).await?;
        Ok(())
    }

    /// Initiates server shutdown: stops accepting, closes all live
    /// connections, releases the listening socket. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the accept loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}
