//! Connection configuration

use crate::error::HBaseError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default gateway host
pub const DEFAULT_HOST: &str = "localhost";

/// Default gateway port (HBase Thrift server default)
pub const DEFAULT_PORT: u16 = 9090;

/// Connect attempts per connect sequence
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 2;

/// RPC stack spoken to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// Thrift binary protocol over a (buffered or framed) socket
    #[default]
    Thrift,
    /// Avro binary IPC over HTTP
    Http,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Thrift => "thrift",
            Protocol::Http => "http",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = HBaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "thrift" => Ok(Protocol::Thrift),
            "http" | "avro" => Ok(Protocol::Http),
            other => Err(HBaseError::InvalidArgument(format!("unknown protocol '{}'", other))),
        }
    }
}

/// Configuration for a [`Connection`](crate::Connection)
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Gateway host
    pub host: String,

    /// Gateway port
    pub port: u16,

    /// RPC stack
    pub protocol: Protocol,

    /// Use Thrift framed transport instead of buffered
    pub framed: bool,

    /// Attempts per connect sequence (at least 1, no delay between attempts)
    pub connect_attempts: u32,

    /// Bound on establishing a transport; `None` waits on socket defaults
    pub connect_timeout: Option<Duration>,

    /// Bound on a single RPC round trip; `None` waits on socket defaults
    pub request_timeout: Option<Duration>,

    /// Request path for the HTTP gateway
    pub http_path: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            protocol: Protocol::Thrift,
            framed: false,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_timeout: None,
            request_timeout: None,
            http_path: "/".to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Create a config for the given endpoint with default settings
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_framed(mut self, framed: bool) -> Self {
        self.framed = framed;
        self
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_http_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.http_path = if path.starts_with('/') { path } else { format!("/{}", path) };
        self
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
