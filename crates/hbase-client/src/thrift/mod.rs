//! Thrift binary RPC transport
//!
//! Speaks the Hbase Thrift service over a buffered socket, or over a framed
//! socket (4-byte big-endian length prefix) when the gateway runs in framed
//! mode.

pub mod hbase;
pub mod protocol;

pub use protocol::{MessageHeader, MessageType, ProtocolError, TType, ThriftReader};

use crate::config::ConnectionConfig;
use crate::error::{HBaseError, Result};
use crate::rpc::{Call, Reply};
use crate::transport::{Transport, TransportFactory};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::debug;

/// Opens [`ThriftTransport`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct ThriftFactory;

#[async_trait]
impl TransportFactory for ThriftFactory {
    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn Transport>> {
        Ok(Box::new(ThriftTransport::connect(config).await?))
    }
}

/// One socket to a Thrift gateway
pub struct ThriftTransport {
    stream: BufStream<TcpStream>,
    framed: bool,
    seqid: i32,
    request_timeout: Option<Duration>,
}

async fn bounded<T, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| HBaseError::Timeout(limit))?,
        None => fut.await,
    }
}

impl ThriftTransport {
    /// Open the socket and wrap it in the buffered (or framed) layer
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let addr = config.address();
        let stream = bounded(config.connect_timeout, async {
            TcpStream::connect(addr.as_str()).await.map_err(HBaseError::from)
        })
        .await?;
        stream.set_nodelay(true)?;
        debug!(peer = %addr, framed = config.framed, "thrift transport open");

        Ok(Self {
            stream: BufStream::new(stream),
            framed: config.framed,
            seqid: 0,
            request_timeout: config.request_timeout,
        })
    }

    async fn round_trip(&mut self, call: &Call) -> Result<Reply> {
        self.seqid = self.seqid.wrapping_add(1);
        let seqid = self.seqid;

        let mut message = Vec::with_capacity(128);
        hbase::write_call(&mut message, call, seqid);

        if self.framed {
            self.stream.write_all(&(message.len() as u32).to_be_bytes()).await?;
        }
        self.stream.write_all(&message).await?;
        self.stream.flush().await?;

        if self.framed {
            let mut len = [0u8; 4];
            self.stream.read_exact(&mut len).await?;
            let len = u32::from_be_bytes(len) as usize;
            if len > protocol::MAX_SIZE {
                return Err(ProtocolError::PayloadTooLarge(len).into());
            }
            let mut frame = vec![0u8; len];
            self.stream.read_exact(&mut frame).await?;
            let mut reader = ThriftReader::new(&frame[..]);
            hbase::read_reply(&mut reader, call, seqid).await
        } else {
            let mut reader = ThriftReader::new(&mut self.stream);
            hbase::read_reply(&mut reader, call, seqid).await
        }
    }
}

#[async_trait]
impl Transport for ThriftTransport {
    async fn call(&mut self, call: &Call) -> Result<Reply> {
        debug!(method = call.name(), seqid = self.seqid.wrapping_add(1), "thrift call");
        let limit = self.request_timeout;
        bounded(limit, self.round_trip(call)).await
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::protocol::{
        write_binary, write_binary_field, write_field_begin, write_field_stop, write_list_begin,
        write_message_begin,
    };
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::BufReader;
    use tokio::net::TcpListener;

    /// Serve one connection; `respond` builds the reply body for each call
    async fn fake_gateway<F>(framed: bool, respond: F) -> SocketAddr
    where
        F: Fn(&MessageHeader, &mut Vec<u8>) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (rd, mut wr) = socket.into_split();
            let mut rd = BufReader::new(rd);
            loop {
                let header = if framed {
                    let mut len = [0u8; 4];
                    if rd.read_exact(&mut len).await.is_err() {
                        return;
                    }
                    let mut frame = vec![0u8; u32::from_be_bytes(len) as usize];
                    rd.read_exact(&mut frame).await.unwrap();
                    let mut reader = ThriftReader::new(&frame[..]);
                    let header = reader.read_message_begin().await.unwrap();
                    reader.skip(TType::Struct).await.unwrap();
                    header
                } else {
                    let mut reader = ThriftReader::new(&mut rd);
                    let header = match reader.read_message_begin().await {
                        Ok(header) => header,
                        Err(_) => return,
                    };
                    reader.skip(TType::Struct).await.unwrap();
                    header
                };

                let mut body = Vec::new();
                write_message_begin(&mut body, &header.name, MessageType::Reply, header.seqid);
                respond(&header, &mut body);

                if framed {
                    wr.write_all(&(body.len() as u32).to_be_bytes()).await.unwrap();
                }
                wr.write_all(&body).await.unwrap();
            }
        });

        addr
    }

    fn config_for(addr: SocketAddr) -> ConnectionConfig {
        ConnectionConfig::new(addr.ip().to_string(), addr.port())
    }

    fn table_names(header: &MessageHeader, buf: &mut Vec<u8>) {
        assert_eq!(header.name, "getTableNames");
        write_field_begin(buf, TType::List, 0);
        write_list_begin(buf, TType::String, 2);
        write_binary(buf, b"users");
        write_binary(buf, b"events");
        write_field_stop(buf);
    }

    #[tokio::test]
    async fn test_buffered_round_trips() {
        let addr = fake_gateway(false, table_names).await;
        let mut transport = ThriftTransport::connect(&config_for(addr)).await.unwrap();

        for _ in 0..2 {
            let names = transport
                .call(&Call::GetTableNames)
                .await
                .unwrap()
                .into_names("getTableNames")
                .unwrap();
            assert_eq!(names, vec!["users".to_string(), "events".to_string()]);
        }
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_framed_round_trip() {
        let addr = fake_gateway(true, table_names).await;
        let config = config_for(addr).with_framed(true);
        let mut transport = ThriftTransport::connect(&config).await.unwrap();

        let names = transport.call(&Call::GetTableNames).await.unwrap();
        assert_eq!(names, Reply::Names(vec!["users".into(), "events".into()]));
    }

    #[tokio::test]
    async fn test_remote_io_error() {
        let addr = fake_gateway(false, |_, buf| {
            write_field_begin(buf, TType::Struct, 1);
            write_binary_field(buf, 1, b"table missing");
            write_field_stop(buf);
            write_field_stop(buf);
        })
        .await;
        let mut transport = ThriftTransport::connect(&config_for(addr)).await.unwrap();

        let err = transport
            .call(&Call::EnableTable { table: "missing".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, HBaseError::Remote(ref m) if m == "table missing"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and never answer
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let config = config_for(addr).with_request_timeout(Duration::from_millis(50));
        let mut transport = ThriftTransport::connect(&config).await.unwrap();
        let err = transport.call(&Call::GetTableNames).await.unwrap_err();
        assert!(matches!(err, HBaseError::Timeout(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let err = ThriftFactory.open(&config_for(addr)).await.err().unwrap();
        assert!(matches!(err, HBaseError::Io(_)));
    }
}
