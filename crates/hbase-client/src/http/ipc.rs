//! Avro IPC over HTTP
//!
//! A request body is the framed concatenation of a handshake request, call
//! metadata, the message name and the parameter record. The response body
//! carries a handshake response, metadata, an error flag and then either the
//! response datum or an error-union datum.
//!
//! Framing is a run of buffers, each a 4-byte big-endian length followed by
//! that many bytes, closed by a zero-length buffer.

use super::avro;
use super::protocol::GatewayProtocol;
use crate::error::{HBaseError, Result};
use apache_avro::types::Value;
use apache_avro::{from_avro_datum, to_avro_datum, Schema};
use std::collections::HashMap;
use tracing::debug;

pub const CONTENT_TYPE: &str = "avro/binary";

/// Largest buffer written by [`frame`]
pub const BUFFER_SIZE: usize = 8192;

const HANDSHAKE_REQUEST: &str = r#"{
  "type": "record", "name": "HandshakeRequest", "namespace": "org.apache.avro.ipc",
  "fields": [
    {"name": "clientHash", "type": {"type": "fixed", "name": "MD5", "size": 16}},
    {"name": "clientProtocol", "type": ["null", "string"]},
    {"name": "serverHash", "type": "MD5"},
    {"name": "meta", "type": ["null", {"type": "map", "values": "bytes"}]}
  ]
}"#;

const HANDSHAKE_RESPONSE: &str = r#"{
  "type": "record", "name": "HandshakeResponse", "namespace": "org.apache.avro.ipc",
  "fields": [
    {"name": "match", "type": {"type": "enum", "name": "HandshakeMatch", "symbols": ["BOTH", "CLIENT", "NONE"]}},
    {"name": "serverProtocol", "type": ["null", "string"]},
    {"name": "serverHash", "type": ["null", {"type": "fixed", "name": "MD5", "size": 16}]},
    {"name": "meta", "type": ["null", {"type": "map", "values": "bytes"}]}
  ]
}"#;

const METADATA: &str = r#"{"type": "map", "values": "bytes"}"#;

pub fn frame(payload: &[u8]) -> Vec<u8> {
    let chunks = payload.len().div_ceil(BUFFER_SIZE);
    let mut out = Vec::with_capacity(payload.len() + 4 * (chunks + 1));
    for chunk in payload.chunks(BUFFER_SIZE) {
        // chunk.len() <= BUFFER_SIZE
        out.extend_from_slice(&(chunk.len() as u32).to_be_bytes());
        out.extend_from_slice(chunk);
    }
    out.extend_from_slice(&0u32.to_be_bytes());
    out
}

pub fn unframe(mut body: &[u8]) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(body.len());
    loop {
        if body.len() < 4 {
            return Err(HBaseError::Malformed("truncated Avro frame header".to_string()));
        }
        let (header, rest) = body.split_at(4);
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if len == 0 {
            return Ok(payload);
        }
        if rest.len() < len {
            return Err(HBaseError::Malformed(format!(
                "Avro frame of {} bytes, only {} remain",
                len,
                rest.len()
            )));
        }
        payload.extend_from_slice(&rest[..len]);
        body = &rest[len..];
    }
}

/// Request and response codec for one gateway protocol
pub struct Ipc {
    protocol: GatewayProtocol,
    handshake_request: Schema,
    handshake_response: Schema,
    metadata: Schema,
    /// Hash the server last reported; our own hash until then
    server_hash: Option<[u8; 16]>,
}

impl Ipc {
    pub fn new(protocol: GatewayProtocol) -> Result<Self> {
        Ok(Self {
            protocol,
            handshake_request: Schema::parse_str(HANDSHAKE_REQUEST)?,
            handshake_response: Schema::parse_str(HANDSHAKE_RESPONSE)?,
            metadata: Schema::parse_str(METADATA)?,
            server_hash: None,
        })
    }

    pub fn protocol(&self) -> &GatewayProtocol {
        &self.protocol
    }

    /// Framed request body for `message` with its parameter record
    pub fn encode_request(&self, message: &str, params: Value) -> Result<Vec<u8>> {
        let schema = &self.protocol.message(message)?.request;
        let client_hash = self.protocol.hash();

        let handshake = Value::Record(vec![
            ("clientHash".to_string(), Value::Fixed(16, client_hash.to_vec())),
            (
                "clientProtocol".to_string(),
                Value::Union(1, Box::new(Value::String(self.protocol.text().to_string()))),
            ),
            (
                "serverHash".to_string(),
                Value::Fixed(16, self.server_hash.unwrap_or(client_hash).to_vec()),
            ),
            ("meta".to_string(), Value::Union(0, Box::new(Value::Null))),
        ]);

        let mut payload = to_avro_datum(&self.handshake_request, handshake)?;
        payload.extend(to_avro_datum(&self.metadata, Value::Map(HashMap::new()))?);
        payload.extend(to_avro_datum(&Schema::String, Value::String(message.to_string()))?);
        payload.extend(to_avro_datum(schema, params)?);
        Ok(frame(&payload))
    }

    /// Response datum of `message`, or the declared error it carried
    pub fn decode_response(&mut self, message: &str, body: &[u8]) -> Result<Value> {
        let payload = unframe(body)?;
        let mut cursor = &payload[..];

        let handshake = from_avro_datum(&self.handshake_response, &mut cursor, None)?;
        self.accept_handshake(&handshake)?;
        from_avro_datum(&self.metadata, &mut cursor, None)?;

        let message = self.protocol.message(message)?;
        match from_avro_datum(&Schema::Boolean, &mut cursor, None)? {
            Value::Boolean(false) => Ok(from_avro_datum(&message.response, &mut cursor, None)?),
            Value::Boolean(true) => {
                let error = from_avro_datum(&message.errors, &mut cursor, None)?;
                Err(avro::decode_error(&message.error_names, &error))
            }
            other => Err(HBaseError::Malformed(format!("expected error flag, got {:?}", other))),
        }
    }

    fn accept_handshake(&mut self, handshake: &Value) -> Result<()> {
        match avro::field(handshake, "match")? {
            Value::Enum(_, symbol) if symbol == "NONE" => {
                return Err(HBaseError::Avro("gateway rejected the client protocol".to_string()))
            }
            Value::Enum(_, symbol) => debug!(handshake = %symbol, "avro handshake"),
            other => return Err(HBaseError::Malformed(format!("expected handshake match, got {:?}", other))),
        }
        if let Value::Fixed(_, hash) = avro::field(handshake, "serverHash")? {
            if let Ok(hash) = <[u8; 16]>::try_from(hash.as_slice()) {
                self.server_hash = Some(hash);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
impl Ipc {
    /// Handshake response with `match` set to `symbol`
    pub(crate) fn handshake(symbol: &str, server_hash: Option<[u8; 16]>) -> Value {
        let index = ["BOTH", "CLIENT", "NONE"].iter().position(|s| *s == symbol).unwrap_or(0);
        let hash = match server_hash {
            Some(h) => Value::Union(1, Box::new(Value::Fixed(16, h.to_vec()))),
            None => Value::Union(0, Box::new(Value::Null)),
        };
        Value::Record(vec![
            ("match".to_string(), Value::Enum(index as u32, symbol.to_string())),
            ("serverProtocol".to_string(), Value::Union(0, Box::new(Value::Null))),
            ("serverHash".to_string(), hash),
            ("meta".to_string(), Value::Union(0, Box::new(Value::Null))),
        ])
    }

    /// Framed gateway reply; `Err` carries an error-union branch and datum
    pub(crate) fn encode_reply(
        &self,
        message: &str,
        handshake: Value,
        outcome: std::result::Result<Value, (u32, Value)>,
    ) -> Vec<u8> {
        let message = self.protocol.message(message).unwrap();
        let mut payload = to_avro_datum(&self.handshake_response, handshake).unwrap();
        payload.extend(to_avro_datum(&self.metadata, Value::Map(HashMap::new())).unwrap());
        match outcome {
            Ok(datum) => {
                payload.extend(to_avro_datum(&Schema::Boolean, Value::Boolean(false)).unwrap());
                payload.extend(to_avro_datum(&message.response, datum).unwrap());
            }
            Err((branch, datum)) => {
                payload.extend(to_avro_datum(&Schema::Boolean, Value::Boolean(true)).unwrap());
                payload.extend(to_avro_datum(&message.errors, Value::Union(branch, Box::new(datum))).unwrap());
            }
        }
        frame(&payload)
    }

    /// Handshake, message name and parameters of a framed request body
    pub(crate) fn decode_call(&self, body: &[u8]) -> (Value, String, Value) {
        let payload = unframe(body).unwrap();
        let mut cursor = &payload[..];
        let handshake = from_avro_datum(&self.handshake_request, &mut cursor, None).unwrap();
        from_avro_datum(&self.metadata, &mut cursor, None).unwrap();
        let name = match from_avro_datum(&Schema::String, &mut cursor, None).unwrap() {
            Value::String(name) => name,
            other => panic!("message name is {:?}", other),
        };
        let schema = &self.protocol.message(&name).unwrap().request;
        let params = from_avro_datum(schema, &mut cursor, None).unwrap();
        assert!(cursor.is_empty(), "{} trailing bytes", cursor.len());
        (handshake, name, params)
    }
}
