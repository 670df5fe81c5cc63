//! Transport error types

use shared_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,

    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Send error: {0}")]
    Send(String),

    #[error("Failed to read {path}: {reason}")]
    FileRead { path: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Endpoint registry stopped")]
    RegistryClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_errors_keep_their_message() {
        let err: TransportError = ProtocolError::InvalidFileName("a|b".into()).into();
        assert!(matches!(err, TransportError::Protocol(_)));
        assert_eq!(err.to_string(), "Protocol error: Invalid file name: \"a|b\"");

        let err: TransportError =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
