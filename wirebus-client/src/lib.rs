//! # wirebus-client
//!
//! Client library for wirebus.
//!
//! This crate provides:
//! - One async TCP connection to a bus server with a background read loop
//! - Method registration with locally-invoked handlers
//! - Synchronous calls (`call`) that suspend the caller until the reply
//! - Asynchronous calls (`acall`) resolving a [`CallResult`] handle

pub mod client;
pub mod connection;
pub mod error;
pub mod handler;
pub mod result;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
pub use handler::Handler;
pub use result::CallResult;
