//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use crate::result::CallResult;
use std::sync::Arc;
use tokio::task::JoinHandle;
use wirebus_protocol::{Message, Payload};

/// A bus client: one connection to the server, local method handlers, and
/// the sync/async call paths.
pub struct Client {
    conn: Arc<Connection>,
    read_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Connects to the server and starts the background read loop.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        let conn = Arc::new(Connection::new(config));
        conn.connect().await?;

        let reader = conn.clone();
        let read_task = tokio::spawn(async move {
            // read_loop logs its own exit reason and fails pending calls.
            let _ = reader.read_loop().await;
        });

        Ok(Self {
            conn,
            read_task: parking_lot::Mutex::new(Some(read_task)),
        })
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Publishes a method on the bus, served by `handler`.
    ///
    /// The handler runs on the connection's I/O task for every incoming
    /// request and must not block (see [`crate::handler::Handler`]). The
    /// registration is acknowledged by the server before this returns; on
    /// failure the handler is not kept.
    pub async fn register_method<F>(&self, name: &str, handler: F) -> Result<(), ClientError>
    where
        F: Fn(&Payload) -> Payload + Send + Sync + 'static,
    {
        self.conn.handlers().insert(name, Arc::new(handler));

        let msg = Message::register(self.conn.next_request_id(), name);
        match self.conn.roundtrip(msg).await {
            Ok(_ack) => Ok(()),
            Err(e) => {
                self.conn.handlers().remove(name);
                Err(e)
            }
        }
    }

    /// Calls `method` and suspends until its response, the configured
    /// request timeout, or connection loss. Never silently drops a response:
    /// the outcome is always surfaced here.
    pub async fn call(&self, method: &str, args: Payload) -> Result<Payload, ClientError> {
        let msg = Message::request(self.conn.next_request_id(), method, args);
        self.conn.roundtrip(msg).await
    }

    /// Starts a call and returns immediately with a [`CallResult`] the I/O
    /// task resolves when the reply arrives.
    pub async fn acall(&self, method: &str, args: Payload) -> Result<CallResult, ClientError> {
        let msg = Message::request(self.conn.next_request_id(), method, args);
        let rx = self.conn.submit(msg).await?;
        Ok(CallResult::new(rx))
    }

    /// Closes the connection. All pending calls unblock with a
    /// connection-closed error. Idempotent.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.conn.close().await?;
        if let Some(task) = self.read_task.lock().take() {
            task.abort();
        }
        Ok(())
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }
}
