//! Thrift binary protocol codec
//!
//! Writers append to a `Vec<u8>`; the reader pulls from any async byte
//! source so replies can be decoded straight off a buffered socket or out of
//! a received frame.

use bytes::Bytes;
use futures::future::BoxFuture;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Protocol error types
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid field type: {0}")]
    InvalidType(u8),

    #[error("Invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("Bad protocol version: {0:#010x}")]
    BadVersion(u32),

    #[error("Negative size: {0}")]
    NegativeSize(i32),

    #[error("Payload too large: {0} bytes (max 64MB)")]
    PayloadTooLarge(usize),

    #[error("Struct nesting exceeds {0} levels")]
    DepthLimit(usize),

    #[error("Invalid UTF-8 string")]
    InvalidUtf8,

    #[error("Unexpected end of data")]
    UnexpectedEof,

    #[error("Expected reply to {expected}, got {actual}")]
    MethodMismatch { expected: String, actual: String },

    #[error("Sequence id mismatch: expected {expected}, got {actual}")]
    SeqIdMismatch { expected: i32, actual: i32 },

    #[error("Field {field} has type {actual:?}, expected {expected:?}")]
    FieldType {
        field: i16,
        expected: TType,
        actual: TType,
    },
}

/// Wire type codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TType {
    Stop = 0,
    Bool = 2,
    Byte = 3,
    Double = 4,
    I16 = 6,
    I32 = 8,
    I64 = 10,
    String = 11,
    Struct = 12,
    Map = 13,
    Set = 14,
    List = 15,
}

impl TryFrom<u8> for TType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(TType::Stop),
            2 => Ok(TType::Bool),
            3 => Ok(TType::Byte),
            4 => Ok(TType::Double),
            6 => Ok(TType::I16),
            8 => Ok(TType::I32),
            10 => Ok(TType::I64),
            11 => Ok(TType::String),
            12 => Ok(TType::Struct),
            13 => Ok(TType::Map),
            14 => Ok(TType::Set),
            15 => Ok(TType::List),
            _ => Err(ProtocolError::InvalidType(byte)),
        }
    }
}

/// Message type codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call = 1,
    Reply = 2,
    Exception = 3,
    Oneway = 4,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            1 => Ok(MessageType::Call),
            2 => Ok(MessageType::Reply),
            3 => Ok(MessageType::Exception),
            4 => Ok(MessageType::Oneway),
            _ => Err(ProtocolError::InvalidMessageType(byte)),
        }
    }
}

/// Decoded message header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub name: String,
    pub kind: MessageType,
    pub seqid: i32,
}

const VERSION_1: u32 = 0x8001_0000;
const VERSION_MASK: u32 = 0xffff_0000;

/// Upper bound for strings, binaries, container lengths and frames
pub const MAX_SIZE: usize = 64 * 1024 * 1024; // 64MB

const MAX_DEPTH: usize = 64;

// ==================== Writers ====================

/// Strict message header: version | type, name, seqid
pub fn write_message_begin(buf: &mut Vec<u8>, name: &str, kind: MessageType, seqid: i32) {
    buf.extend_from_slice(&(VERSION_1 | kind as u32).to_be_bytes());
    write_string(buf, name);
    write_i32(buf, seqid);
}

pub fn write_field_begin(buf: &mut Vec<u8>, ttype: TType, id: i16) {
    buf.push(ttype as u8);
    write_i16(buf, id);
}

pub fn write_field_stop(buf: &mut Vec<u8>) {
    buf.push(TType::Stop as u8);
}

pub fn write_bool(buf: &mut Vec<u8>, value: bool) {
    buf.push(value as u8);
}

pub fn write_byte(buf: &mut Vec<u8>, value: i8) {
    buf.push(value as u8);
}

pub fn write_i16(buf: &mut Vec<u8>, value: i16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

pub fn write_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

pub fn write_i64(buf: &mut Vec<u8>, value: i64) {
    buf.extend_from_slice(&value.to_be_bytes());
}

pub fn write_double(buf: &mut Vec<u8>, value: f64) {
    buf.extend_from_slice(&value.to_bits().to_be_bytes());
}

pub fn write_binary(buf: &mut Vec<u8>, value: &[u8]) {
    write_i32(buf, value.len() as i32);
    buf.extend_from_slice(value);
}

pub fn write_string(buf: &mut Vec<u8>, value: &str) {
    write_binary(buf, value.as_bytes());
}

pub fn write_list_begin(buf: &mut Vec<u8>, elem: TType, len: usize) {
    buf.push(elem as u8);
    write_i32(buf, len as i32);
}

pub fn write_map_begin(buf: &mut Vec<u8>, key: TType, value: TType, len: usize) {
    buf.push(key as u8);
    buf.push(value as u8);
    write_i32(buf, len as i32);
}

pub fn write_binary_field(buf: &mut Vec<u8>, id: i16, value: &[u8]) {
    write_field_begin(buf, TType::String, id);
    write_binary(buf, value);
}

pub fn write_i32_field(buf: &mut Vec<u8>, id: i16, value: i32) {
    write_field_begin(buf, TType::I32, id);
    write_i32(buf, value);
}

pub fn write_bool_field(buf: &mut Vec<u8>, id: i16, value: bool) {
    write_field_begin(buf, TType::Bool, id);
    write_bool(buf, value);
}

// ==================== Reader ====================

/// Pull-based decoder over an async byte source
pub struct ThriftReader<R> {
    inner: R,
}

impl<R> ThriftReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    async fn fill(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        match self.inner.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ProtocolError::UnexpectedEof),
            Err(e) => Err(ProtocolError::Io(e)),
        }
    }

    /// Accepts both strict and legacy (non-strict) headers
    pub async fn read_message_begin(&mut self) -> Result<MessageHeader, ProtocolError> {
        let first = self.read_i32().await?;
        if first < 0 {
            let word = first as u32;
            if word & VERSION_MASK != VERSION_1 {
                return Err(ProtocolError::BadVersion(word & VERSION_MASK));
            }
            let kind = MessageType::try_from((word & 0xff) as u8)?;
            let name = self.read_string().await?;
            let seqid = self.read_i32().await?;
            Ok(MessageHeader { name, kind, seqid })
        } else {
            // Legacy header: the first word is the name length
            let name = self.read_sized(first).await?;
            let name = String::from_utf8(name).map_err(|_| ProtocolError::InvalidUtf8)?;
            let kind = MessageType::try_from(self.read_byte().await? as u8)?;
            let seqid = self.read_i32().await?;
            Ok(MessageHeader { name, kind, seqid })
        }
    }

    /// Returns `None` at the struct's stop marker
    pub async fn read_field_begin(&mut self) -> Result<Option<(TType, i16)>, ProtocolError> {
        let ttype = TType::try_from(self.read_byte().await? as u8)?;
        if ttype == TType::Stop {
            return Ok(None);
        }
        let id = self.read_i16().await?;
        Ok(Some((ttype, id)))
    }

    pub async fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_byte().await? != 0)
    }

    pub async fn read_byte(&mut self) -> Result<i8, ProtocolError> {
        let mut b = [0u8; 1];
        self.fill(&mut b).await?;
        Ok(b[0] as i8)
    }

    pub async fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        let mut b = [0u8; 2];
        self.fill(&mut b).await?;
        Ok(i16::from_be_bytes(b))
    }

    pub async fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let mut b = [0u8; 4];
        self.fill(&mut b).await?;
        Ok(i32::from_be_bytes(b))
    }

    pub async fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        let mut b = [0u8; 8];
        self.fill(&mut b).await?;
        Ok(i64::from_be_bytes(b))
    }

    pub async fn read_double(&mut self) -> Result<f64, ProtocolError> {
        Ok(f64::from_bits(self.read_i64().await? as u64))
    }

    async fn read_sized(&mut self, len: i32) -> Result<Vec<u8>, ProtocolError> {
        let len = checked_size(len)?;
        let mut data = vec![0u8; len];
        if len > 0 {
            self.fill(&mut data).await?;
        }
        Ok(data)
    }

    pub async fn read_binary(&mut self) -> Result<Bytes, ProtocolError> {
        let len = self.read_i32().await?;
        Ok(Bytes::from(self.read_sized(len).await?))
    }

    pub async fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_i32().await?;
        String::from_utf8(self.read_sized(len).await?).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// List or set header: element type and length
    pub async fn read_list_begin(&mut self) -> Result<(TType, usize), ProtocolError> {
        let elem = TType::try_from(self.read_byte().await? as u8)?;
        let len = checked_size(self.read_i32().await?)?;
        Ok((elem, len))
    }

    /// Map header: key type, value type and length
    pub async fn read_map_begin(&mut self) -> Result<(TType, TType, usize), ProtocolError> {
        let key = TType::try_from(self.read_byte().await? as u8)?;
        let value = TType::try_from(self.read_byte().await? as u8)?;
        let len = checked_size(self.read_i32().await?)?;
        Ok((key, value, len))
    }

    /// Consume and discard one value of the given type
    pub fn skip(&mut self, ttype: TType) -> BoxFuture<'_, Result<(), ProtocolError>> {
        self.skip_nested(ttype, MAX_DEPTH)
    }

    fn skip_nested(&mut self, ttype: TType, depth: usize) -> BoxFuture<'_, Result<(), ProtocolError>> {
        Box::pin(async move {
            if depth == 0 {
                return Err(ProtocolError::DepthLimit(MAX_DEPTH));
            }
            match ttype {
                TType::Stop => return Err(ProtocolError::InvalidType(TType::Stop as u8)),
                TType::Bool | TType::Byte => {
                    self.read_byte().await?;
                }
                TType::I16 => {
                    self.read_i16().await?;
                }
                TType::I32 => {
                    self.read_i32().await?;
                }
                TType::I64 | TType::Double => {
                    self.read_i64().await?;
                }
                TType::String => {
                    self.read_binary().await?;
                }
                TType::Struct => {
                    while let Some((field_type, _)) = self.read_field_begin().await? {
                        self.skip_nested(field_type, depth - 1).await?;
                    }
                }
                TType::Map => {
                    let (key, value, len) = self.read_map_begin().await?;
                    for _ in 0..len {
                        self.skip_nested(key, depth - 1).await?;
                        self.skip_nested(value, depth - 1).await?;
                    }
                }
                TType::Set | TType::List => {
                    let (elem, len) = self.read_list_begin().await?;
                    for _ in 0..len {
                        self.skip_nested(elem, depth - 1).await?;
                    }
                }
            }
            Ok(())
        })
    }
}

fn checked_size(len: i32) -> Result<usize, ProtocolError> {
    if len < 0 {
        return Err(ProtocolError::NegativeSize(len));
    }
    let len = len as usize;
    if len > MAX_SIZE {
        return Err(ProtocolError::PayloadTooLarge(len));
    }
    Ok(len)
}

/// Fail with [`ProtocolError::FieldType`] unless `actual == expected`
pub fn expect_type(field: i16, expected: TType, actual: TType) -> Result<(), ProtocolError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ProtocolError::FieldType {
            field,
            expected,
            actual,
        })
    }
}
