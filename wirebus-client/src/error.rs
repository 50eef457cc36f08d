//! Client error types.

use std::net::SocketAddr;
use thiserror::Error;
use wirebus_protocol::ErrorCode;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {0} timed out")]
    ConnectTimeout(SocketAddr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] wirebus_protocol::ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timed out")]
    Timeout,

    #[error("bus error: {code} - {message}")]
    Bus { code: ErrorCode, message: String },
}

impl ClientError {
    /// Returns the wire error code if the failure came from the bus.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Bus { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns whether this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Timeout => true,
            ClientError::ConnectionClosed => true,
            ClientError::Connect { .. } | ClientError::ConnectTimeout(_) => true,
            ClientError::Bus { code, .. } => code.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::ConnectionClosed.is_retryable());
        assert!(!ClientError::NotConnected.is_retryable());
        assert!(!ClientError::Bus {
            code: ErrorCode::MethodNotFound,
            message: String::new(),
        }
        .is_retryable());
    }

    #[test]
    fn test_bus_error_exposes_code() {
        let err = ClientError::Bus {
            code: ErrorCode::MethodNotFound,
            message: "no handler".to_string(),
        };
        assert_eq!(err.code(), Some(ErrorCode::MethodNotFound));
        assert!(err.to_string().contains("METHOD_NOT_FOUND"));

        assert_eq!(ClientError::Timeout.code(), None);
    }
}
