//! Hbase Thrift service: argument encoding and result decoding

use super::protocol::{
    expect_type, write_binary, write_binary_field, write_bool_field, write_field_begin,
    write_field_stop, write_i32_field, write_list_begin, write_message_begin, MessageType,
    ProtocolError, TType, ThriftReader,
};
use crate::error::{HBaseError, Result};
use crate::rpc::{Call, Reply};
use crate::types::{Cell, Column, ColumnDescriptor, Mutation, RegionInfo, RowResult};
use bytes::Bytes;
use std::collections::BTreeMap;
use tokio::io::AsyncRead;

/// Encode a complete CALL message for `call`
pub fn write_call(buf: &mut Vec<u8>, call: &Call, seqid: i32) {
    write_message_begin(buf, call.name(), MessageType::Call, seqid);

    match call {
        Call::GetTableNames => {}
        Call::GetColumnDescriptors { table }
        | Call::DescribeFamily { table, .. }
        | Call::GetTableRegions { table }
        | Call::IsTableEnabled { table }
        | Call::EnableTable { table }
        | Call::DisableTable { table }
        | Call::DeleteTable { table }
        | Call::Compact { table }
        | Call::MajorCompact { table } => {
            write_binary_field(buf, 1, table.as_bytes());
        }
        Call::CreateTable { table, families } => {
            write_binary_field(buf, 1, table.as_bytes());
            write_field_begin(buf, TType::List, 2);
            write_list_begin(buf, TType::Struct, families.len());
            for family in families {
                write_column_descriptor(buf, family);
            }
        }
        Call::GetRow { table, row, columns } => {
            write_binary_field(buf, 1, table.as_bytes());
            write_binary_field(buf, 2, row);
            if !columns.is_empty() {
                write_columns_field(buf, 3, columns);
            }
        }
        Call::GetVersions { table, row, column, versions } => {
            write_binary_field(buf, 1, table.as_bytes());
            write_binary_field(buf, 2, row);
            write_binary_field(buf, 3, column.to_string().as_bytes());
            write_i32_field(buf, 4, *versions);
        }
        Call::MutateRow { table, row, mutations } => {
            write_binary_field(buf, 1, table.as_bytes());
            write_binary_field(buf, 2, row);
            write_field_begin(buf, TType::List, 3);
            write_list_begin(buf, TType::Struct, mutations.len());
            for mutation in mutations {
                write_mutation(buf, mutation);
            }
        }
        Call::DeleteAll { table, row, column } => {
            write_binary_field(buf, 1, table.as_bytes());
            write_binary_field(buf, 2, row);
            write_binary_field(buf, 3, column.to_string().as_bytes());
        }
        Call::DeleteAllRow { table, row } => {
            write_binary_field(buf, 1, table.as_bytes());
            write_binary_field(buf, 2, row);
        }
        Call::ScannerOpen { table, start_row, columns } => {
            write_binary_field(buf, 1, table.as_bytes());
            write_binary_field(buf, 2, start_row);
            write_columns_field(buf, 3, columns);
        }
        Call::ScannerGetList { id, rows } => {
            write_i32_field(buf, 1, *id);
            write_i32_field(buf, 2, *rows);
        }
        Call::ScannerClose { id } => {
            write_i32_field(buf, 1, *id);
        }
    }

    write_field_stop(buf);
}

fn write_columns_field(buf: &mut Vec<u8>, id: i16, columns: &[Column]) {
    write_field_begin(buf, TType::List, id);
    write_list_begin(buf, TType::String, columns.len());
    for column in columns {
        write_binary(buf, column.to_string().as_bytes());
    }
}

fn write_column_descriptor(buf: &mut Vec<u8>, d: &ColumnDescriptor) {
    write_binary_field(buf, 1, d.name.as_bytes());
    write_i32_field(buf, 2, d.max_versions);
    write_binary_field(buf, 3, d.compression.as_bytes());
    write_bool_field(buf, 4, d.in_memory);
    write_binary_field(buf, 5, d.bloom_filter_type.as_bytes());
    write_i32_field(buf, 6, d.bloom_filter_vector_size);
    write_i32_field(buf, 7, d.bloom_filter_nb_hashes);
    write_bool_field(buf, 8, d.block_cache_enabled);
    write_i32_field(buf, 9, d.time_to_live);
    write_field_stop(buf);
}

fn write_mutation(buf: &mut Vec<u8>, m: &Mutation) {
    write_bool_field(buf, 1, m.is_delete);
    write_binary_field(buf, 2, m.column.to_string().as_bytes());
    write_binary_field(buf, 3, &m.value);
    write_field_stop(buf);
}

/// Decode the reply message matching `call` / `seqid`
pub async fn read_reply<R>(reader: &mut ThriftReader<R>, call: &Call, seqid: i32) -> Result<Reply>
where
    R: AsyncRead + Unpin + Send,
{
    let header = reader.read_message_begin().await?;
    if header.name != call.name() {
        return Err(ProtocolError::MethodMismatch {
            expected: call.name().to_string(),
            actual: header.name,
        }
        .into());
    }
    if header.seqid != seqid {
        return Err(ProtocolError::SeqIdMismatch {
            expected: seqid,
            actual: header.seqid,
        }
        .into());
    }

    match header.kind {
        MessageType::Reply => read_result(reader, call).await,
        MessageType::Exception => Err(read_application_exception(reader).await?),
        other => Err(ProtocolError::InvalidMessageType(other as u8).into()),
    }
}

async fn read_result<R>(reader: &mut ThriftReader<R>, call: &Call) -> Result<Reply>
where
    R: AsyncRead + Unpin + Send,
{
    let mut success = None;
    let mut failure = None;

    while let Some((ttype, id)) = reader.read_field_begin().await? {
        match (id, ttype) {
            (0, _) => success = read_success(reader, call, ttype).await?,
            (1, TType::Struct) => failure = Some(HBaseError::Remote(read_exception_message(reader).await?)),
            (2, TType::Struct) => {
                failure = Some(HBaseError::IllegalArgument(read_exception_message(reader).await?))
            }
            (3, TType::Struct) => {
                failure = Some(HBaseError::AlreadyExists(read_exception_message(reader).await?))
            }
            _ => reader.skip(ttype).await?,
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }

    match (call, success) {
        (Call::DescribeFamily { table, family }, Some(Reply::Families(families))) => families
            .into_iter()
            .find(|d| d.family() == family.trim_end_matches(':'))
            .map(Reply::Family)
            .ok_or_else(|| {
                HBaseError::IllegalArgument(format!("no family '{}' in table '{}'", family, table))
            }),
        (_, Some(reply)) => Ok(reply),
        (_, None) if returns_void(call) => Ok(Reply::Unit),
        (_, None) => Err(HBaseError::Application {
            kind: "MISSING_RESULT".to_string(),
            message: format!("{} failed: unknown result", call.name()),
        }),
    }
}

fn returns_void(call: &Call) -> bool {
    matches!(
        call,
        Call::CreateTable { .. }
            | Call::EnableTable { .. }
            | Call::DisableTable { .. }
            | Call::DeleteTable { .. }
            | Call::Compact { .. }
            | Call::MajorCompact { .. }
            | Call::MutateRow { .. }
            | Call::DeleteAll { .. }
            | Call::DeleteAllRow { .. }
            | Call::ScannerClose { .. }
    )
}

/// Decode field 0 of a result struct; `None` if the call returns void
async fn read_success<R>(reader: &mut ThriftReader<R>, call: &Call, ttype: TType) -> Result<Option<Reply>>
where
    R: AsyncRead + Unpin + Send,
{
    let reply = match call {
        Call::GetTableNames => {
            expect_type(0, TType::List, ttype)?;
            let (_, len) = reader.read_list_begin().await?;
            let mut names = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                names.push(lossy(&reader.read_binary().await?));
            }
            Reply::Names(names)
        }
        Call::GetColumnDescriptors { .. } | Call::DescribeFamily { .. } => {
            expect_type(0, TType::Map, ttype)?;
            let (_, _, len) = reader.read_map_begin().await?;
            let mut families = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                reader.read_binary().await?;
                families.push(read_column_descriptor(reader).await?);
            }
            Reply::Families(families)
        }
        Call::GetTableRegions { .. } => {
            expect_type(0, TType::List, ttype)?;
            let (_, len) = reader.read_list_begin().await?;
            let mut regions = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                regions.push(read_region_info(reader).await?);
            }
            Reply::Regions(regions)
        }
        Call::IsTableEnabled { .. } => {
            expect_type(0, TType::Bool, ttype)?;
            Reply::Bool(reader.read_bool().await?)
        }
        Call::GetRow { .. } | Call::ScannerGetList { .. } => {
            expect_type(0, TType::List, ttype)?;
            let (_, len) = reader.read_list_begin().await?;
            let mut rows = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                rows.push(read_row_result(reader).await?);
            }
            Reply::Rows(rows)
        }
        Call::GetVersions { .. } => {
            expect_type(0, TType::List, ttype)?;
            let (_, len) = reader.read_list_begin().await?;
            let mut cells = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                cells.push(read_cell(reader).await?);
            }
            Reply::Cells(cells)
        }
        Call::ScannerOpen { .. } => {
            expect_type(0, TType::I32, ttype)?;
            Reply::ScannerId(reader.read_i32().await?)
        }
        _ => {
            reader.skip(ttype).await?;
            return Ok(None);
        }
    };
    Ok(Some(reply))
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

async fn read_exception_message<R>(reader: &mut ThriftReader<R>) -> Result<String>
where
    R: AsyncRead + Unpin + Send,
{
    let mut message = String::new();
    while let Some((ttype, id)) = reader.read_field_begin().await? {
        match (id, ttype) {
            (1, TType::String) => message = lossy(&reader.read_binary().await?),
            _ => reader.skip(ttype).await?,
        }
    }
    Ok(message)
}

async fn read_application_exception<R>(reader: &mut ThriftReader<R>) -> Result<HBaseError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut message = String::new();
    let mut kind = 0;
    while let Some((ttype, id)) = reader.read_field_begin().await? {
        match (id, ttype) {
            (1, TType::String) => message = lossy(&reader.read_binary().await?),
            (2, TType::I32) => kind = reader.read_i32().await?,
            _ => reader.skip(ttype).await?,
        }
    }
    Ok(HBaseError::Application {
        kind: application_error_kind(kind).to_string(),
        message,
    })
}

fn application_error_kind(code: i32) -> &'static str {
    match code {
        1 => "UNKNOWN_METHOD",
        2 => "INVALID_MESSAGE_TYPE",
        3 => "WRONG_METHOD_NAME",
        4 => "BAD_SEQUENCE_ID",
        5 => "MISSING_RESULT",
        6 => "INTERNAL_ERROR",
        7 => "PROTOCOL_ERROR",
        _ => "UNKNOWN",
    }
}

async fn read_column_descriptor<R>(reader: &mut ThriftReader<R>) -> Result<ColumnDescriptor>
where
    R: AsyncRead + Unpin + Send,
{
    let mut d = ColumnDescriptor::default();
    while let Some((ttype, id)) = reader.read_field_begin().await? {
        match (id, ttype) {
            (1, TType::String) => d.name = lossy(&reader.read_binary().await?),
            (2, TType::I32) => d.max_versions = reader.read_i32().await?,
            (3, TType::String) => d.compression = lossy(&reader.read_binary().await?),
            (4, TType::Bool) => d.in_memory = reader.read_bool().await?,
            (5, TType::String) => d.bloom_filter_type = lossy(&reader.read_binary().await?),
            (6, TType::I32) => d.bloom_filter_vector_size = reader.read_i32().await?,
            (7, TType::I32) => d.bloom_filter_nb_hashes = reader.read_i32().await?,
            (8, TType::Bool) => d.block_cache_enabled = reader.read_bool().await?,
            (9, TType::I32) => d.time_to_live = reader.read_i32().await?,
            _ => reader.skip(ttype).await?,
        }
    }
    Ok(d)
}

async fn read_region_info<R>(reader: &mut ThriftReader<R>) -> Result<RegionInfo>
where
    R: AsyncRead + Unpin + Send,
{
    let mut region = RegionInfo::default();
    while let Some((ttype, id)) = reader.read_field_begin().await? {
        match (id, ttype) {
            (1, TType::String) => region.start_key = reader.read_binary().await?,
            (2, TType::String) => region.end_key = reader.read_binary().await?,
            (3, TType::I64) => region.id = reader.read_i64().await?,
            (4, TType::String) => region.name = reader.read_binary().await?,
            (5, TType::Byte) => region.version = reader.read_byte().await?,
            _ => reader.skip(ttype).await?,
        }
    }
    Ok(region)
}

async fn read_cell<R>(reader: &mut ThriftReader<R>) -> Result<Cell>
where
    R: AsyncRead + Unpin + Send,
{
    let mut value = Bytes::new();
    let mut timestamp = 0;
    while let Some((ttype, id)) = reader.read_field_begin().await? {
        match (id, ttype) {
            (1, TType::String) => value = reader.read_binary().await?,
            (2, TType::I64) => timestamp = reader.read_i64().await?,
            _ => reader.skip(ttype).await?,
        }
    }
    Ok(Cell { value, timestamp })
}

async fn read_row_result<R>(reader: &mut ThriftReader<R>) -> Result<RowResult>
where
    R: AsyncRead + Unpin + Send,
{
    let mut row = Bytes::new();
    let mut columns = BTreeMap::new();
    while let Some((ttype, id)) = reader.read_field_begin().await? {
        match (id, ttype) {
            (1, TType::String) => row = reader.read_binary().await?,
            (2, TType::Map) => {
                let (_, _, len) = reader.read_map_begin().await?;
                for _ in 0..len {
                    let column = lossy(&reader.read_binary().await?);
                    let cell = read_cell(reader).await?;
                    columns.insert(column, cell);
                }
            }
            _ => reader.skip(ttype).await?,
        }
    }
    Ok(RowResult { row, columns })
}
