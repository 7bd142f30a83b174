//! HTTP gateway transport
//!
//! Each call is one `POST` of an `avro/binary` Avro IPC request to the
//! gateway endpoint. Remote errors come back in-band with a 2xx status.

pub mod avro;
pub mod ipc;
pub mod protocol;

use crate::config::ConnectionConfig;
use crate::error::{HBaseError, Result};
use crate::rpc::{Call, Reply};
use crate::transport::{Transport, TransportFactory};
use async_trait::async_trait;
use ipc::Ipc;
use protocol::GatewayProtocol;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use url::Url;

/// Opens [`HttpTransport`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpFactory;

#[async_trait]
impl TransportFactory for HttpFactory {
    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn Transport>> {
        Ok(Box::new(HttpTransport::new(config)?))
    }
}

/// HTTP client bound to one gateway endpoint
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    ipc: Ipc,
}

impl HttpTransport {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let endpoint = Url::parse(&format!("http://{}{}", config.address(), config.http_path))
            .map_err(|e| HBaseError::InvalidArgument(format!("invalid gateway address: {}", e)))?;

        let mut builder = reqwest::Client::builder()
            .user_agent(format!("hbase-client/{}", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        let ipc = Ipc::new(GatewayProtocol::hbase()?)?;

        debug!(endpoint = %endpoint, "http transport open");
        Ok(Self { client, endpoint, ipc })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&mut self, call: &Call) -> Result<Reply> {
        let (message, params) = avro::encode_call(call)?;
        let body = self.ipc.encode_request(message, params)?;
        debug!(rpc = message, bytes = body.len(), "http call");

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, ipc::CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(HBaseError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let datum = self.ipc.decode_response(message, &body)?;
        avro::decode_response(call, &datum)
    }

    async fn close(&mut self) -> Result<()> {
        // Pooled connections are released when the client drops
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, ColumnDescriptor, Mutation};
    use apache_avro::types::Value;
    use bytes::Bytes;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn codec() -> Ipc {
        Ipc::new(GatewayProtocol::hbase().unwrap()).unwrap()
    }

    fn reply(message: &str, outcome: std::result::Result<Value, (u32, Value)>) -> ResponseTemplate {
        let body = codec().encode_reply(message, Ipc::handshake("BOTH", None), outcome);
        ResponseTemplate::new(200)
            .insert_header("content-type", ipc::CONTENT_TYPE)
            .set_body_bytes(body)
    }

    fn record(fields: Vec<(&str, Value)>) -> Value {
        Value::Record(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn table(name: &str) -> Value {
        avro::encode_table(name, &[])
    }

    async fn transport_for(server: &MockServer) -> HttpTransport {
        let addr = server.address();
        HttpTransport::new(&ConnectionConfig::new(addr.ip().to_string(), addr.port())).unwrap()
    }

    async fn sent_calls(server: &MockServer) -> Vec<(String, Value)> {
        let codec = codec();
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| {
                let (_, name, params) = codec.decode_call(&request.body);
                (name, params)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_list_tables() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("content-type", "avro/binary"))
            .respond_with(reply("listTables", Ok(Value::Array(vec![table("users"), table("events")]))))
            .expect(1)
            .mount(&server)
            .await;

        let mut transport = transport_for(&server).await;
        let names = transport.call(&Call::GetTableNames).await.unwrap();
        assert_eq!(names, Reply::Names(vec!["users".into(), "events".into()]));

        let sent = sent_calls(&server).await;
        assert_eq!(sent, vec![("listTables".to_string(), record(vec![]))]);
    }

    #[tokio::test]
    async fn test_get_row() {
        let server = MockServer::start().await;
        let result = record(vec![
            ("row", Value::Bytes(b"r1".to_vec())),
            (
                "entries",
                Value::Array(vec![record(vec![
                    ("family", Value::Bytes(b"f".to_vec())),
                    ("qualifier", Value::Bytes(b"a".to_vec())),
                    ("value", Value::Bytes(b"1".to_vec())),
                    ("timestamp", Value::Long(7)),
                ])]),
            ),
        ]);
        Mock::given(method("POST"))
            .respond_with(reply("get", Ok(result)))
            .expect(1)
            .mount(&server)
            .await;

        let mut transport = transport_for(&server).await;
        let call = Call::GetRow {
            table: "t".into(),
            row: Bytes::from_static(b"r1"),
            columns: vec![],
        };
        let rows = transport.call(&call).await.unwrap().into_rows("get").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns["f:a"].timestamp, 7);

        let sent = sent_calls(&server).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "get");
        let get = avro::field(&sent[0].1, "get").unwrap();
        assert_eq!(avro::field(get, "row").unwrap(), &Value::Bytes(b"r1".to_vec()));
        assert_eq!(avro::field(get, "columns").unwrap(), &Value::Null);
    }

    #[tokio::test]
    async fn test_remote_error_body() {
        let server = MockServer::start().await;
        let error = record(vec![("message", Value::String("table t not found".to_string()))]);
        Mock::given(method("POST"))
            .respond_with(reply("isTableEnabled", Err((1, error))))
            .mount(&server)
            .await;

        let mut transport = transport_for(&server).await;
        let err = transport
            .call(&Call::IsTableEnabled { table: "t".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, HBaseError::Remote(ref m) if m == "table t not found"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_server_error_status_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let mut transport = transport_for(&server).await;
        let err = transport.call(&Call::GetTableNames).await.unwrap_err();
        assert!(matches!(err, HBaseError::Status { status: 503, ref body } if body == "overloaded"));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_garbage_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"response\": []}"))
            .mount(&server)
            .await;

        let mut transport = transport_for(&server).await;
        let err = transport.call(&Call::GetTableNames).await.unwrap_err();
        assert!(matches!(err, HBaseError::Malformed(_) | HBaseError::Avro(_)));
    }

    #[tokio::test]
    async fn test_unsupported_call_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut transport = transport_for(&server).await;
        let err = transport
            .call(&Call::MajorCompact { table: "t".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, HBaseError::Unsupported { .. }));
    }

    #[test]
    fn test_every_supported_call_matches_its_schema() {
        let row = Bytes::from_static(b"r");
        let calls = vec![
            Call::GetTableNames,
            Call::GetColumnDescriptors { table: "t".into() },
            Call::DescribeFamily { table: "t".into(), family: "f:".into() },
            Call::IsTableEnabled { table: "t".into() },
            Call::CreateTable {
                table: "t".into(),
                families: vec![ColumnDescriptor::new("f:"), ColumnDescriptor::new("g:")],
            },
            Call::CreateTable { table: "t".into(), families: vec![] },
            Call::EnableTable { table: "t".into() },
            Call::DisableTable { table: "t".into() },
            Call::DeleteTable { table: "t".into() },
            Call::GetRow { table: "t".into(), row: row.clone(), columns: vec![] },
            Call::GetRow {
                table: "t".into(),
                row: row.clone(),
                columns: vec![Column::new("f", "a"), Column::family("g")],
            },
            Call::GetVersions {
                table: "t".into(),
                row: row.clone(),
                column: Column::new("f", "a"),
                versions: 3,
            },
            Call::MutateRow {
                table: "t".into(),
                row: row.clone(),
                mutations: vec![Mutation::put(Column::new("f", "a"), "1")],
            },
            Call::MutateRow {
                table: "t".into(),
                row: row.clone(),
                mutations: vec![Mutation::delete(Column::new("f", "a"))],
            },
            Call::DeleteAll { table: "t".into(), row: row.clone(), column: Column::family("f") },
            Call::DeleteAllRow { table: "t".into(), row: row.clone() },
            Call::ScannerOpen { table: "t".into(), start_row: row, columns: vec![Column::family("f")] },
            Call::ScannerGetList { id: 4, rows: 10 },
            Call::ScannerClose { id: 4 },
        ];

        let codec = codec();
        for call in &calls {
            let (message, params) = avro::encode_call(call).unwrap();
            let body = codec
                .encode_request(message, params.clone())
                .unwrap_or_else(|e| panic!("{} does not match its schema: {}", call.name(), e));
            let (_, name, decoded) = codec.decode_call(&body);
            assert_eq!(name, message);
            assert_eq!(decoded, params, "{} changed on the wire", call.name());
        }
    }

    #[test]
    fn test_endpoint_path() {
        let config = ConnectionConfig::new("gateway", 9090).with_http_path("hbase");
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.endpoint().as_str(), "http://gateway:9090/hbase");
    }
}
