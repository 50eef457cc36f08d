//! Envelope types carried by bus frames.

use crate::error::{ErrorCode, ProtocolError};
use crate::payload::Payload;

/// Reserved payload key holding the error code in `Error` frames.
pub const ERROR_CODE_KEY: &str = "code";

/// Reserved payload key holding the error description in `Error` frames.
pub const ERROR_MESSAGE_KEY: &str = "message";

/// Frame kinds on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Kind {
    /// A method invocation. Carries the method name.
    Request = 1,
    /// Successful reply to a `Request` or `Register` with the same id.
    Response = 2,
    /// Failure reply; payload carries `code` and `message` entries.
    Error = 3,
    /// Method registration. Carries the method name being published.
    Register = 4,
}

impl Kind {
    /// Parses the wire byte for a frame kind.
    pub fn from_wire(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            1 => Ok(Kind::Request),
            2 => Ok(Kind::Response),
            3 => Ok(Kind::Error),
            4 => Ok(Kind::Register),
            other => Err(ProtocolError::UnknownKind(other)),
        }
    }
}

/// One envelope plus payload: the unit a frame carries.
///
/// `request_id` correlates replies to requests. It is allocated by the sender
/// and must be unique among that sender's in-flight requests; every `Request`
/// or `Register` eventually yields exactly one `Response` or `Error` bearing
/// the same id, or times out on the caller's side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: Kind,
    pub request_id: u64,
    /// Method name; empty for `Response` and `Error` frames.
    pub method: String,
    pub payload: Payload,
}

impl Message {
    /// Creates a method invocation.
    pub fn request(request_id: u64, method: impl Into<String>, payload: Payload) -> Self {
        Self {
            kind: Kind::Request,
            request_id,
            method: method.into(),
            payload,
        }
    }

    /// Creates a successful reply.
    pub fn response(request_id: u64, payload: Payload) -> Self {
        Self {
            kind: Kind::Response,
            request_id,
            method: String::new(),
            payload,
        }
    }

    /// Creates a failure reply.
    pub fn error(request_id: u64, code: ErrorCode, description: impl Into<String>) -> Self {
        let payload = Payload::new()
            .with(ERROR_CODE_KEY, code.as_str())
            .with(ERROR_MESSAGE_KEY, description);
        Self {
            kind: Kind::Error,
            request_id,
            method: String::new(),
            payload,
        }
    }

    /// Creates a method registration announcement.
    pub fn register(request_id: u64, method: impl Into<String>) -> Self {
        Self {
            kind: Kind::Register,
            request_id,
            method: method.into(),
            payload: Payload::new(),
        }
    }

    /// Returns whether this message answers an earlier request.
    pub fn is_reply(&self) -> bool {
        matches!(self.kind, Kind::Response | Kind::Error)
    }

    /// Extracts the error code from an `Error` frame's payload.
    ///
    /// A missing or unrecognized code reads as `Internal`.
    pub fn error_code(&self) -> ErrorCode {
        self.payload
            .get(ERROR_CODE_KEY)
            .map(ErrorCode::from_wire)
            .unwrap_or(ErrorCode::Internal)
    }

    /// Extracts the human-readable description from an `Error` frame.
    pub fn error_message(&self) -> &str {
        self.payload.get(ERROR_MESSAGE_KEY).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_wire() {
        assert_eq!(Kind::from_wire(1).unwrap(), Kind::Request);
        assert_eq!(Kind::from_wire(2).unwrap(), Kind::Response);
        assert_eq!(Kind::from_wire(3).unwrap(), Kind::Error);
        assert_eq!(Kind::from_wire(4).unwrap(), Kind::Register);
        assert!(matches!(
            Kind::from_wire(0),
            Err(ProtocolError::UnknownKind(0))
        ));
        assert!(matches!(
            Kind::from_wire(9),
            Err(ProtocolError::UnknownKind(9))
        ));
    }

    #[test]
    fn test_request_constructor() {
        let msg = Message::request(7, "echo", Payload::new().with("name", "BBT"));
        assert_eq!(msg.kind, Kind::Request);
        assert_eq!(msg.request_id, 7);
        assert_eq!(msg.method, "echo");
        assert!(!msg.is_reply());
    }

    #[test]
    fn test_error_carries_code_and_message() {
        let msg = Message::error(3, ErrorCode::MethodNotFound, "no handler for 'echo'");
        assert!(msg.is_reply());
        assert_eq!(msg.error_code(), ErrorCode::MethodNotFound);
        assert_eq!(msg.error_message(), "no handler for 'echo'");
    }

    #[test]
    fn test_error_code_defaults_to_internal() {
        let msg = Message::response(1, Payload::new());
        assert_eq!(msg.error_code(), ErrorCode::Internal);
        assert_eq!(msg.error_message(), "");
    }

    #[test]
    fn test_register_has_empty_payload() {
        let msg = Message::register(2, "echo");
        assert_eq!(msg.kind, Kind::Register);
        assert_eq!(msg.method, "echo");
        assert!(msg.payload.is_empty());
    }
}
