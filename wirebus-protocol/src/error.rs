//! Protocol error types and wire error codes.

use std::fmt;
use thiserror::Error;

/// Protocol-level errors that can occur during framing.
///
/// Any of these on a live connection is unrecoverable for that connection:
/// the peer is out of sync and the stream must be closed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("unknown frame kind: {0:#x}")]
    UnknownKind(u8),

    #[error("truncated frame: missing {0}")]
    Truncated(&'static str),

    #[error("frame has {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("method name too long: {0} bytes (max 65535)")]
    MethodTooLong(usize),

    #[error("payload key too long: {0} bytes (max 65535)")]
    KeyTooLong(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable error codes carried in `Error` frames.
///
/// These codes are part of the protocol contract and must remain stable
/// across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No handler is registered for the requested method.
    MethodNotFound,
    /// The connection owning the handler went away mid-call.
    ConnectionClosed,
    /// The request could not be understood.
    BadRequest,
    /// Unclassified server-side failure.
    Internal,
}

impl ErrorCode {
    /// Returns the stable wire representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MethodNotFound => "METHOD_NOT_FOUND",
            ErrorCode::ConnectionClosed => "CONNECTION_CLOSED",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Internal => "INTERNAL_ERROR",
        }
    }

    /// Parses a wire code, mapping anything unrecognized to `Internal`.
    ///
    /// Unknown codes come from newer peers; treating them as internal errors
    /// keeps old clients functioning instead of failing the connection.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "METHOD_NOT_FOUND" => ErrorCode::MethodNotFound,
            "CONNECTION_CLOSED" => ErrorCode::ConnectionClosed,
            "BAD_REQUEST" => ErrorCode::BadRequest,
            _ => ErrorCode::Internal,
        }
    }

    /// Returns whether a call failing with this code is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::ConnectionClosed | ErrorCode::Internal)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_roundtrip() {
        for code in [
            ErrorCode::MethodNotFound,
            ErrorCode::ConnectionClosed,
            ErrorCode::BadRequest,
            ErrorCode::Internal,
        ] {
            assert_eq!(ErrorCode::from_wire(code.as_str()), code);
        }
    }

    #[test]
    fn test_unknown_code_maps_to_internal() {
        assert_eq!(ErrorCode::from_wire("RATE_LIMITED"), ErrorCode::Internal);
        assert_eq!(ErrorCode::from_wire(""), ErrorCode::Internal);
    }

    #[test]
    fn test_error_code_retryable() {
        assert!(ErrorCode::ConnectionClosed.is_retryable());
        assert!(ErrorCode::Internal.is_retryable());
        assert!(!ErrorCode::MethodNotFound.is_retryable());
        assert!(!ErrorCode::BadRequest.is_retryable());
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(format!("{}", ErrorCode::MethodNotFound), "METHOD_NOT_FOUND");
        assert_eq!(
            format!("{}", ErrorCode::ConnectionClosed),
            "CONNECTION_CLOSED"
        );
        assert_eq!(format!("{}", ErrorCode::BadRequest), "BAD_REQUEST");
        assert_eq!(format!("{}", ErrorCode::Internal), "INTERNAL_ERROR");
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::FrameTooLarge {
            size: 100,
            max: 50,
        };
        assert!(err.to_string().contains("100"));

        let err = ProtocolError::UnknownKind(0x7f);
        assert!(err.to_string().contains("7f"));

        let err = ProtocolError::Truncated("request_id");
        assert!(err.to_string().contains("request_id"));

        let err = ProtocolError::InvalidUtf8("method");
        assert!(err.to_string().contains("method"));
    }
}
