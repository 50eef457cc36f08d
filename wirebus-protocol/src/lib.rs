//! # wirebus-protocol
//!
//! Wire protocol implementation for wirebus.
//!
//! This crate provides:
//! - Binary framing with a length prefix and fixed-width big-endian fields
//! - Envelope types with request-id correlation
//! - Flat string key/value payloads
//! - Error codes and protocol constants

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod payload;

pub use codec::Decoder;
pub use error::{ErrorCode, ProtocolError};
pub use frame::{decode, encode, LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE};
pub use message::{Kind, Message};
pub use payload::Payload;

/// Default port for a wirebus server.
pub const DEFAULT_PORT: u16 = 7450;
