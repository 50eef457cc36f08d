//! Connection management.

use crate::error::ClientError;
use crate::handler::HandlerTable;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use wirebus_protocol::{frame, Decoder, ErrorCode, Kind, Message, Payload};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Timeout for synchronous calls and registrations.
    pub request_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }
}

/// Error-frame contents delivered to a failed call.
#[derive(Debug, Clone)]
pub(crate) struct BusFault {
    pub code: ErrorCode,
    pub message: String,
}

impl From<BusFault> for ClientError {
    fn from(fault: BusFault) -> Self {
        ClientError::Bus {
            code: fault.code,
            message: fault.message,
        }
    }
}

/// Reply delivered by the read loop to a pending-call slot.
pub(crate) type Reply = Result<Payload, BusFault>;

/// A connection to a bus server.
///
/// One physical socket shared by every call and every served handler.
/// Requests are correlated to replies through the pending-call table; the
/// read loop is the only writer into it besides timeout removal.
pub struct Connection {
    config: ConnectionConfig,
    /// Write half; writers serialize on this lock so frames never interleave.
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Read half, taken by the read loop.
    reader: Mutex<Option<OwnedReadHalf>>,
    /// Pending requests awaiting replies.
    pending: parking_lot::Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    /// Methods served locally.
    handlers: HandlerTable,
    /// Next request ID.
    next_id: AtomicU64,
    /// Is the connection established?
    connected: AtomicBool,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            pending: parking_lot::Mutex::new(HashMap::new()),
            handlers: HandlerTable::new(),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connects to the server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        tracing::debug!("connecting to {}", self.config.addr);

        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| ClientError::ConnectTimeout(self.config.addr))?
        .map_err(|source| ClientError::Connect {
            addr: self.config.addr,
            source,
        })?;

        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);
        *self.reader.lock().await = Some(read_half);
        self.connected.store(true, Ordering::SeqCst);

        tracing::debug!("connected to {}", self.config.addr);
        Ok(())
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Allocates the next request id. Monotonic, unique among this
    /// connection's in-flight requests.
    pub fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Encodes and writes one frame. Concurrent writers (a caller task and
    /// the read loop answering a served request) serialize on the writer
    /// lock, so frames are never interleaved mid-frame.
    pub(crate) async fn send_message(&self, msg: &Message) -> Result<(), ClientError> {
        let bytes = frame::encode(msg)?;
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer.write_all(&bytes).await.map_err(ClientError::Io)
    }

    /// Registers a pending-call slot and sends the request. Returns the
    /// receiver the read loop will resolve.
    pub(crate) async fn submit(
        &self,
        msg: Message,
    ) -> Result<oneshot::Receiver<Reply>, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let request_id = msg.request_id;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);

        if let Err(e) = self.send_message(&msg).await {
            self.pending.lock().remove(&request_id);
            return Err(e);
        }

        tracing::debug!("request id={} sent ({:?})", request_id, msg.kind);
        Ok(rx)
    }

    /// Sends a request and suspends the calling task until its reply
    /// arrives, bounded by the configured request timeout. The I/O task is
    /// never blocked.
    pub(crate) async fn roundtrip(&self, msg: Message) -> Result<Payload, ClientError> {
        let request_id = msg.request_id;
        let rx = self.submit(msg).await?;

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Err(_) => {
                // Remove the slot now; a late reply finds it absent and is
                // discarded by the read loop.
                self.pending.lock().remove(&request_id);
                tracing::debug!("request id={} timed out", request_id);
                Err(ClientError::Timeout)
            }
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Ok(Ok(reply)) => reply.map_err(ClientError::from),
        }
    }

    /// Reads and dispatches frames until the connection dies. Run this in a
    /// background task; pending calls are failed before it returns.
    pub async fn read_loop(&self) -> Result<(), ClientError> {
        let result = self.read_frames().await;
        self.connected.store(false, Ordering::SeqCst);
        self.fail_pending();
        if let Err(ref e) = result {
            tracing::debug!("read loop ended: {}", e);
        }
        result
    }

    async fn read_frames(&self) -> Result<(), ClientError> {
        let mut decoder = Decoder::new();
        let mut buf = vec![0u8; self.config.read_buffer_size];

        loop {
            let n = {
                let mut guard = self.reader.lock().await;
                let reader = guard.as_mut().ok_or(ClientError::NotConnected)?;
                reader.read(&mut buf).await.map_err(ClientError::Io)?
            };

            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            decoder.extend(&buf[..n]);

            while let Some(msg) = decoder.next_message()? {
                self.handle_message(msg).await?;
            }
        }
    }

    async fn handle_message(&self, msg: Message) -> Result<(), ClientError> {
        match msg.kind {
            // A call for a method this client serves.
            Kind::Request => {
                let reply = match self.handlers.get(&msg.method) {
                    Some(handler) => Message::response(msg.request_id, handler(&msg.payload)),
                    None => {
                        tracing::warn!("request for unregistered method '{}'", msg.method);
                        Message::error(
                            msg.request_id,
                            ErrorCode::MethodNotFound,
                            format!("no local handler for '{}'", msg.method),
                        )
                    }
                };
                self.send_message(&reply).await
            }

            Kind::Response => {
                self.resolve(msg.request_id, Ok(msg.payload));
                Ok(())
            }

            Kind::Error => {
                let fault = BusFault {
                    code: msg.error_code(),
                    message: msg.error_message().to_string(),
                };
                self.resolve(msg.request_id, Err(fault));
                Ok(())
            }

            Kind::Register => {
                tracing::warn!("unexpected register frame from server, ignoring");
                Ok(())
            }
        }
    }

    /// Hands a reply to its pending-call slot. A missing slot (timed-out or
    /// duplicate reply) is discarded; the oneshot sender is consumed on use,
    /// so a slot can never be resolved twice.
    fn resolve(&self, request_id: u64, reply: Reply) {
        match self.pending.lock().remove(&request_id) {
            Some(tx) => {
                // The receiver may have been dropped (abandoned CallResult).
                let _ = tx.send(reply);
            }
            None => {
                tracing::debug!("no pending call for id={}, discarding reply", request_id);
            }
        }
    }

    /// Drops all pending-call slots; their receivers observe a closed
    /// channel and report the connection as closed.
    fn fail_pending(&self) {
        let mut pending = self.pending.lock();
        if !pending.is_empty() {
            tracing::debug!("failing {} pending requests", pending.len());
        }
        pending.clear();
    }

    /// Closes the connection. All pending calls unblock with a
    /// connection-closed error. Idempotent.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        // The read loop observes EOF once the peer tears down; if it is not
        // running, drop the read half here.
        let _ = self.reader.lock().await.take();

        self.fail_pending();
        Ok(())
    }

    /// Returns the number of requests awaiting replies.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
