//! Local handler registry.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use wirebus_protocol::Payload;

/// A registered method handler.
///
/// Handlers are synchronous, fire-and-forget functions of the request
/// payload, invoked on the connection's I/O task when a request for their
/// method arrives. They must not block: long work belongs on another
/// execution context arranged before returning (e.g. respond with a ticket
/// and publish completion through another method).
pub type Handler = Arc<dyn Fn(&Payload) -> Payload + Send + Sync>;

/// Method name -> handler, shared between the API side and the read loop.
pub(crate) struct HandlerTable {
    inner: RwLock<HashMap<String, Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts a handler, returning whether it replaced an existing one.
    pub fn insert(&self, name: &str, handler: Handler) -> bool {
        self.inner.write().insert(name.to_string(), handler).is_some()
    }

    /// Removes a handler.
    pub fn remove(&self, name: &str) {
        self.inner.write().remove(name);
    }

    /// Looks up a handler by method name.
    pub fn get(&self, name: &str) -> Option<Handler> {
        self.inner.read().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let table = HandlerTable::new();
        assert!(table.get("echo").is_none());

        let replaced = table.insert("echo", Arc::new(|input: &Payload| input.clone()));
        assert!(!replaced);
        assert!(table.get("echo").is_some());
    }

    #[test]
    fn test_insert_replaces() {
        let table = HandlerTable::new();
        table.insert("m", Arc::new(|_: &Payload| Payload::new().with("v", "1")));
        let replaced = table.insert("m", Arc::new(|_: &Payload| Payload::new().with("v", "2")));
        assert!(replaced);

        let handler = table.get("m").unwrap();
        let out = handler(&Payload::new());
        assert_eq!(out.get("v"), Some("2"));
    }

    #[test]
    fn test_remove() {
        let table = HandlerTable::new();
        table.insert("m", Arc::new(|_: &Payload| Payload::new()));
        table.remove("m");
        assert!(table.get("m").is_none());
    }
}
