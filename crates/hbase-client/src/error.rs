//! Error types for HBase client operations

use crate::thrift::ProtocolError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, HBaseError>;

/// Unified error type for connection and RPC failures
#[derive(Error, Debug)]
pub enum HBaseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Not connected")]
    NotConnected,

    /// Transport could not be established within the connect budget
    #[error("Failed to connect to {host}:{port}: {source}")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: Box<HBaseError>,
    },

    /// RPC-layer exception raised by the server (unknown method, internal error, ...)
    #[error("Application error ({kind}): {message}")]
    Application { kind: String, message: String },

    /// Server-side IOError (missing table, region failures, ...)
    #[error("IOError: {0}")]
    Remote(String),

    #[error("IllegalArgument: {0}")]
    IllegalArgument(String),

    #[error("AlreadyExists: {0}")]
    AlreadyExists(String),

    /// Rejected before anything was sent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{operation} is not supported over {protocol}")]
    Unsupported {
        operation: &'static str,
        protocol: &'static str,
    },

    /// Response decoded but does not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Unexpected reply to {call}: {reply}")]
    UnexpectedReply { call: &'static str, reply: String },

    /// Avro schema, encoding or handshake failure on the HTTP gateway
    #[error("Avro error: {0}")]
    Avro(String),
}

impl From<apache_avro::Error> for HBaseError {
    fn from(e: apache_avro::Error) -> Self {
        HBaseError::Avro(e.to_string())
    }
}

/// Retry classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport-level failure; a fresh connection may succeed
    Transient,
    /// Semantic or client-side failure; retrying cannot help
    Permanent,
}

impl HBaseError {
    /// Classify the error for the reconnect-and-retry policy
    pub fn kind(&self) -> ErrorKind {
        match self {
            HBaseError::Io(_)
            | HBaseError::Protocol(_)
            | HBaseError::Timeout(_)
            | HBaseError::NotConnected
            | HBaseError::Connection { .. } => ErrorKind::Transient,
            HBaseError::Http(e) => {
                if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode() {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
            HBaseError::Status { status, .. } if *status >= 500 => ErrorKind::Transient,
            _ => ErrorKind::Permanent,
        }
    }

    /// Returns true if a reconnect and retry may succeed
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub(crate) fn connection(host: &str, port: u16, source: HBaseError) -> Self {
        HBaseError::Connection {
            host: host.to_string(),
            port,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_transient() {
        let io = HBaseError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert!(io.is_transient());
        assert!(HBaseError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(HBaseError::NotConnected.is_transient());
        assert!(HBaseError::Protocol(ProtocolError::UnexpectedEof).is_transient());
        assert!(HBaseError::Status { status: 503, body: String::new() }.is_transient());
    }

    #[test]
    fn test_remote_errors_are_permanent() {
        assert_eq!(HBaseError::Remote("table not found".into()).kind(), ErrorKind::Permanent);
        assert!(!HBaseError::AlreadyExists("t".into()).is_transient());
        assert!(!HBaseError::IllegalArgument("bad".into()).is_transient());
        assert!(!HBaseError::InvalidArgument("bad column".into()).is_transient());
        assert!(!HBaseError::Status { status: 404, body: String::new() }.is_transient());
        assert!(!HBaseError::Unsupported { operation: "compact", protocol: "http" }.is_transient());
        assert!(!HBaseError::Malformed("missing row".into()).is_transient());
        assert!(!HBaseError::Avro("handshake rejected".into()).is_transient());
    }

    #[test]
    fn test_connection_error_display() {
        let err = HBaseError::connection(
            "db1",
            9090,
            HBaseError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused")),
        );
        assert_eq!(err.to_string(), "Failed to connect to db1:9090: I/O error: refused");
        assert!(std::error::Error::source(&err).is_some());
    }
}
