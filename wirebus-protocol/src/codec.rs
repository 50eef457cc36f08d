//! Streaming decoder for bus frames.

use crate::error::ProtocolError;
use crate::frame;
use crate::message::Message;
use bytes::BytesMut;

/// Accumulates socket reads and yields complete messages.
///
/// Feed raw bytes with [`Decoder::extend`], then drain messages with
/// [`Decoder::next_message`] until it returns `Ok(None)`. A decode error
/// means the stream is unrecoverable and the connection must be closed.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next complete message from the buffer.
    pub fn next_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        frame::decode(&mut self.buffer)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
