//! Per-connection session state.

use crate::registry::ConnectionId;
use std::net::SocketAddr;
use std::time::Instant;
use uuid::Uuid;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Socket accepted, frames flowing.
    Connected,
    /// Close initiated (peer EOF, protocol error, or server shutdown);
    /// no further frames are dispatched.
    Closing,
    /// Socket released and dispatch state cleaned up.
    Closed,
}

/// A client session, owned by its connection task.
pub struct Session {
    /// Unique session ID for log correlation.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    /// Connection id in the server's registry.
    pub connection_id: ConnectionId,

    state: SessionState,

    /// Methods this connection has registered, for logging on close.
    registered: Vec<String>,

    request_count: u64,

    created_at: Instant,
}

impl Session {
    pub fn new(remote_addr: SocketAddr, connection_id: ConnectionId) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            connection_id,
            state: SessionState::Connected,
            registered: Vec::new(),
            request_count: 0,
            created_at: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Advances the lifecycle. States only move forward.
    pub fn set_state(&mut self, state: SessionState) {
        debug_assert!(state >= self.state);
        self.state = state;
    }

    /// Records a registered method name.
    pub fn record_registration(&mut self, method: &str) {
        if !self.registered.iter().any(|m| m == method) {
            self.registered.push(method.to_string());
        }
    }

    /// Records a dispatched request.
    pub fn record_request(&mut self) {
        self.request_count += 1;
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Method names registered by this session.
    pub fn registered_methods(&self) -> &[String] {
        &self.registered
    }

    /// Returns the session age.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}
