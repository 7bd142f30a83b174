//! hbase-client: Reconnecting client for HBase gateways
//!
//! Speaks to an HBase Thrift gateway over a binary socket protocol, or to an
//! HTTP gateway speaking Avro binary IPC. Every operation is wrapped
//! in a reconnect-and-retry-once policy that only fires on transient
//! (transport-level) failures.
//!
//! # Architecture
//!
//! - `Connection`: one method per gateway operation, plus the retry policy
//! - `Transport` / `TransportFactory`: the seam between the connection and
//!   the wire; `DefaultFactory` picks Thrift or HTTP from the config
//! - `thrift`: binary protocol codec and socket transport
//! - `http`: Avro IPC codec and reqwest transport
//! - `scanner`: open/fetch/close cursor sequence
//!
//! ```no_run
//! use hbase_client::{Connection, ConnectionConfig};
//!
//! # async fn demo() -> hbase_client::Result<()> {
//! let mut conn = Connection::open(ConnectionConfig::new("localhost", 9090)).await?;
//! conn.put("users", b"u1", "info", "name", b"ada").await?;
//! let row = conn.get("users", b"u1", &[]).await?;
//! println!("{:?}", row);
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod rpc;
pub mod scanner;
pub mod thrift;
pub mod transport;
pub mod types;

pub use config::{ConnectionConfig, Protocol, DEFAULT_HOST, DEFAULT_PORT};
pub use connection::Connection;
pub use error::{ErrorKind, HBaseError, Result};
pub use rpc::{Call, Operation, Reply};
pub use transport::{DefaultFactory, Transport, TransportFactory};
pub use types::{Cell, Column, ColumnDescriptor, Mutation, RegionInfo, Row, RowResult, TimestampedRow};
