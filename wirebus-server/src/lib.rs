//! # wirebus-server
//!
//! TCP server for wirebus.
//!
//! This crate provides:
//! - TCP connection handling with async I/O
//! - Protocol framing and frame dispatch
//! - The shared method table (method name -> owning connection)
//! - Request forwarding with server-side response correlation
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;

pub use config::{Config, NetworkConfig};
pub use error::ServerError;
pub use registry::{ConnectionId, Registry};
pub use server::{Server, ServerConfig};
pub use session::Session;
