//! Transport abstraction
//!
//! The connection never touches sockets directly. It asks a
//! [`TransportFactory`] for a fresh [`Transport`] whenever it (re)connects,
//! which lets tests inject scripted transports.

use crate::config::{ConnectionConfig, Protocol};
use crate::error::Result;
use crate::http::HttpFactory;
use crate::rpc::{Call, Reply};
use crate::thrift::ThriftFactory;
use async_trait::async_trait;

/// An open channel to the gateway
#[async_trait]
pub trait Transport: Send {
    /// Issue one call and wait for its reply
    async fn call(&mut self, call: &Call) -> Result<Reply>;

    /// Release the underlying connection
    async fn close(&mut self) -> Result<()>;
}

/// Opens transports for a connection
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn Transport>>;
}

/// Picks the Thrift or HTTP stack from [`ConnectionConfig::protocol`]
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFactory;

#[async_trait]
impl TransportFactory for DefaultFactory {
    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn Transport>> {
        match config.protocol {
            Protocol::Thrift => ThriftFactory.open(config).await,
            Protocol::Http => HttpFactory.open(config).await,
        }
    }
}
