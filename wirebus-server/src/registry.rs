//! Shared dispatch state: live connections, the method table, and in-flight
//! request routes.
//!
//! One `Registry` is owned by one `Server`; connection tasks mutate it
//! concurrently through `DashMap`s. It is never process-global.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use wirebus_protocol::Message;

/// Identifies one accepted connection for the lifetime of the server.
pub type ConnectionId = u64;

/// An in-flight request forwarded to a handler's connection, awaiting its
/// reply. Keyed by the server-assigned correlation id that travels as the
/// forwarded frame's request_id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Connection that issued the call.
    pub caller: ConnectionId,
    /// The caller's own request id, restored when the reply is relayed back.
    pub caller_request_id: u64,
    /// Connection serving the method.
    pub handler: ConnectionId,
}

/// Dispatch tables shared by all connection tasks of one server.
pub struct Registry {
    /// Outbound queues of live connections.
    connections: DashMap<ConnectionId, mpsc::Sender<Message>>,
    /// Method name -> owning connection. Last registration wins.
    methods: DashMap<String, ConnectionId>,
    /// Correlation id -> in-flight route.
    routes: DashMap<u64, Route>,
    /// Correlation id allocator. Ids are unique per server lifetime, so a
    /// caller's request_id space colliding with another caller's is harmless.
    next_correlation_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            methods: DashMap::new(),
            routes: DashMap::new(),
            next_correlation_id: AtomicU64::new(1),
        }
    }

    /// Adds a live connection's outbound queue.
    pub fn add_connection(&self, id: ConnectionId, tx: mpsc::Sender<Message>) {
        self.connections.insert(id, tx);
    }

    /// Returns the outbound queue for a connection, if it is still live.
    pub fn sender(&self, id: ConnectionId) -> Option<mpsc::Sender<Message>> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    /// Returns the number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Registers `method` as owned by `owner`, returning the previous owner
    /// if the name was already taken. Last write wins.
    pub fn register_method(&self, method: impl Into<String>, owner: ConnectionId) -> Option<ConnectionId> {
        self.methods.insert(method.into(), owner)
    }

    /// Looks up the connection owning `method`.
    pub fn lookup_method(&self, method: &str) -> Option<ConnectionId> {
        self.methods.get(method).map(|entry| *entry.value())
    }

    /// Returns the number of registered methods.
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Records an in-flight route and returns its correlation id.
    pub fn begin_route(
        &self,
        caller: ConnectionId,
        caller_request_id: u64,
        handler: ConnectionId,
    ) -> u64 {
        let correlation_id = self.next_correlation_id.fetch_add(1, Ordering::Relaxed);
        self.routes.insert(
            correlation_id,
            Route {
                caller,
                caller_request_id,
                handler,
            },
        );
        correlation_id
    }

    /// Resolves a route by correlation id, removing it.
    ///
    /// `None` means the route was already discarded (caller disconnected or
    /// a duplicate reply) and the reply should be dropped.
    pub fn finish_route(&self, correlation_id: u64) -> Option<Route> {
        self.routes.remove(&correlation_id).map(|(_, route)| route)
    }

    /// Removes a closed connection and everything it owned.
    ///
    /// Returns the routes whose handler was this connection; the caller ends
    /// of those must be failed so they don't hang. Routes whose caller was
    /// this connection are silently dropped - there is nobody left to tell.
    pub fn remove_connection(&self, id: ConnectionId) -> Vec<Route> {
        self.connections.remove(&id);
        self.methods.retain(|_, owner| *owner != id);

        let orphaned: Vec<u64> = self
            .routes
            .iter()
            .filter(|entry| entry.value().caller == id || entry.value().handler == id)
            .map(|entry| *entry.key())
            .collect();

        let mut to_fail = Vec::new();
        for correlation_id in orphaned {
            if let Some((_, route)) = self.routes.remove(&correlation_id) {
                if route.handler == id && route.caller != id {
                    to_fail.push(route);
                }
            }
        }
        to_fail
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
