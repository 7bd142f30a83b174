//! Gateway message datums
//!
//! Requests are built as `apache_avro` values in the shape of the message's
//! request record; responses and declared errors are read back from the
//! decoded values. Optional fields are `[T, "null"]` unions, so branch 0 is
//! the present value and branch 1 is null.

use crate::error::{HBaseError, Result};
use crate::rpc::{Call, Reply};
use crate::types::{Cell, Column, ColumnDescriptor, RowResult};
use apache_avro::types::Value;
use bytes::Bytes;
use std::collections::BTreeMap;

pub const PROTOCOL: &str = "http";

fn present(value: Value) -> Value {
    Value::Union(0, Box::new(value))
}

fn absent() -> Value {
    Value::Union(1, Box::new(Value::Null))
}

fn bytes_of(data: impl AsRef<[u8]>) -> Value {
    Value::Bytes(data.as_ref().to_vec())
}

fn record(fields: Vec<(&str, Value)>) -> Value {
    Value::Record(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

fn encode_column(column: &Column) -> Value {
    record(vec![
        ("family", bytes_of(&column.family)),
        (
            "qualifier",
            column.qualifier.as_ref().map(|q| present(bytes_of(q))).unwrap_or_else(absent),
        ),
    ])
}

fn encode_columns(columns: &[Column]) -> Value {
    if columns.is_empty() {
        absent()
    } else {
        present(Value::Array(columns.iter().map(encode_column).collect()))
    }
}

fn encode_get(row: &[u8], columns: &[Column], max_versions: Option<i32>) -> Value {
    record(vec![
        ("row", bytes_of(row)),
        ("columns", encode_columns(columns)),
        ("timestamp", absent()),
        ("timerange", absent()),
        ("maxVersions", max_versions.map(|n| present(Value::Int(n))).unwrap_or_else(absent)),
    ])
}

fn encode_delete(row: &[u8], columns: &[Column]) -> Value {
    record(vec![("row", bytes_of(row)), ("columns", encode_columns(columns))])
}

fn encode_family(family: &ColumnDescriptor) -> Value {
    // Only the name is sent; the gateway applies its own family defaults
    record(vec![
        ("name", bytes_of(family.family())),
        ("compression", absent()),
        ("maxVersions", absent()),
        ("blocksize", absent()),
        ("inMemory", absent()),
        ("timeToLive", absent()),
        ("blockCacheEnabled", absent()),
    ])
}

/// `ATableDescriptor` for createTable
pub(crate) fn encode_table(table: &str, families: &[ColumnDescriptor]) -> Value {
    let families = if families.is_empty() {
        absent()
    } else {
        present(Value::Array(families.iter().map(encode_family).collect()))
    };
    record(vec![
        ("name", bytes_of(table)),
        ("families", families),
        ("maxFileSize", absent()),
        ("memStoreFlushSize", absent()),
        ("rootRegion", absent()),
        ("metaRegion", absent()),
        ("metaTable", absent()),
        ("readOnly", absent()),
        ("deferredLogFlush", absent()),
    ])
}

/// Message name and request record for `call`
pub fn encode_call(call: &Call) -> Result<(&'static str, Value)> {
    let table_only = |table: &str| record(vec![("table", bytes_of(table))]);

    let encoded = match call {
        Call::GetTableNames => ("listTables", record(vec![])),
        Call::GetColumnDescriptors { table } => ("describeTable", table_only(table)),
        Call::DescribeFamily { table, family } => (
            "describeFamily",
            record(vec![
                ("table", bytes_of(table)),
                ("family", bytes_of(family.trim_end_matches(':'))),
            ]),
        ),
        Call::IsTableEnabled { table } => ("isTableEnabled", table_only(table)),
        Call::CreateTable { table, families } => {
            ("createTable", record(vec![("table", encode_table(table, families))]))
        }
        Call::EnableTable { table } => ("enableTable", table_only(table)),
        Call::DisableTable { table } => ("disableTable", table_only(table)),
        Call::DeleteTable { table } => ("deleteTable", table_only(table)),
        Call::GetTableRegions { .. } | Call::Compact { .. } | Call::MajorCompact { .. } => {
            return Err(HBaseError::Unsupported {
                operation: call.name(),
                protocol: PROTOCOL,
            })
        }
        Call::GetRow { table, row, columns } => (
            "get",
            record(vec![("table", bytes_of(table)), ("get", encode_get(row, columns, None))]),
        ),
        Call::GetVersions { table, row, column, versions } => (
            "get",
            record(vec![
                ("table", bytes_of(table)),
                ("get", encode_get(row, std::slice::from_ref(column), Some(*versions))),
            ]),
        ),
        Call::MutateRow { table, row, mutations } => {
            if mutations.is_empty() {
                return Err(HBaseError::InvalidArgument("empty mutation list".to_string()));
            }
            if mutations.iter().all(|m| !m.is_delete) {
                let values = mutations
                    .iter()
                    .map(|m| {
                        record(vec![
                            ("family", bytes_of(&m.column.family)),
                            ("qualifier", bytes_of(m.column.qualifier.as_deref().unwrap_or(""))),
                            ("value", bytes_of(&m.value)),
                            ("timestamp", absent()),
                        ])
                    })
                    .collect();
                (
                    "put",
                    record(vec![
                        ("table", bytes_of(table)),
                        ("put", record(vec![("row", bytes_of(row)), ("columnValues", Value::Array(values))])),
                    ]),
                )
            } else if mutations.iter().all(|m| m.is_delete) {
                let columns: Vec<Column> = mutations.iter().map(|m| m.column.clone()).collect();
                (
                    "delete",
                    record(vec![("table", bytes_of(table)), ("delete", encode_delete(row, &columns))]),
                )
            } else {
                return Err(HBaseError::InvalidArgument(
                    "puts and deletes cannot be mixed in one request".to_string(),
                ));
            }
        }
        Call::DeleteAll { table, row, column } => (
            "delete",
            record(vec![
                ("table", bytes_of(table)),
                ("delete", encode_delete(row, std::slice::from_ref(column))),
            ]),
        ),
        Call::DeleteAllRow { table, row } => (
            "delete",
            record(vec![("table", bytes_of(table)), ("delete", encode_delete(row, &[]))]),
        ),
        Call::ScannerOpen { table, start_row, columns } => (
            "scannerOpen",
            record(vec![
                ("table", bytes_of(table)),
                (
                    "scan",
                    record(vec![
                        ("startRow", present(bytes_of(start_row))),
                        ("stopRow", absent()),
                        ("columns", encode_columns(columns)),
                        ("timestamp", absent()),
                        ("timerange", absent()),
                        ("maxVersions", absent()),
                    ]),
                ),
            ]),
        ),
        Call::ScannerGetList { id, rows } => (
            "scannerGetRows",
            record(vec![("scannerId", Value::Int(*id)), ("numberOfRows", Value::Int(*rows))]),
        ),
        Call::ScannerClose { id } => ("scannerClose", record(vec![("scannerId", Value::Int(*id))])),
    };
    Ok(encoded)
}

/// Strip a union wrapper if present
fn unwrap(value: &Value) -> &Value {
    match value {
        Value::Union(_, inner) => inner,
        other => other,
    }
}

pub(crate) fn field<'a>(record: &'a Value, name: &str) -> Result<&'a Value> {
    match unwrap(record) {
        Value::Record(fields) => fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| unwrap(v))
            .ok_or_else(|| HBaseError::Malformed(format!("missing field '{}'", name))),
        other => Err(HBaseError::Malformed(format!("expected record, got {:?}", other))),
    }
}

/// Field value, `None` when absent or null
fn optional<'a>(record: &'a Value, name: &str) -> Option<&'a Value> {
    field(record, name).ok().filter(|v| !matches!(v, Value::Null))
}

fn bytes(value: &Value) -> Result<Bytes> {
    match unwrap(value) {
        Value::Bytes(b) => Ok(Bytes::copy_from_slice(b)),
        other => Err(HBaseError::Malformed(format!("expected bytes, got {:?}", other))),
    }
}

fn text(value: &Value) -> Result<String> {
    Ok(String::from_utf8_lossy(&bytes(value)?).into_owned())
}

fn long(value: &Value) -> Option<i64> {
    match unwrap(value) {
        Value::Long(n) => Some(*n),
        Value::Int(n) => Some(i64::from(*n)),
        _ => None,
    }
}

fn array<'a>(value: &'a Value, what: &str) -> Result<&'a [Value]> {
    match unwrap(value) {
        Value::Array(items) => Ok(items),
        other => Err(HBaseError::Malformed(format!("expected array of {}, got {:?}", what, other))),
    }
}

fn decode_family(record: &Value) -> Result<ColumnDescriptor> {
    let mut d = ColumnDescriptor::new(text(field(record, "name")?)?);
    if let Some(Value::Int(v)) = optional(record, "maxVersions") {
        d.max_versions = *v;
    }
    if let Some(Value::Enum(_, symbol)) = optional(record, "compression") {
        d.compression = symbol.clone();
    }
    if let Some(Value::Boolean(v)) = optional(record, "inMemory") {
        d.in_memory = *v;
    }
    if let Some(Value::Int(v)) = optional(record, "timeToLive") {
        d.time_to_live = *v;
    }
    if let Some(Value::Boolean(v)) = optional(record, "blockCacheEnabled") {
        d.block_cache_enabled = *v;
    }
    Ok(d)
}

fn decode_result(record: &Value) -> Result<RowResult> {
    let row = bytes(field(record, "row")?)?;
    let mut columns = BTreeMap::new();
    for entry in array(field(record, "entries")?, "AResultEntry")? {
        let family = text(field(entry, "family")?)?;
        let qualifier = text(field(entry, "qualifier")?)?;
        let value = bytes(field(entry, "value")?)?;
        let timestamp = optional(entry, "timestamp").and_then(long).unwrap_or(0);
        columns.insert(format!("{}:{}", family, qualifier), Cell { value, timestamp });
    }
    Ok(RowResult { row, columns })
}

/// Every version of every entry, in gateway order
fn decode_cells(record: &Value) -> Result<Vec<Cell>> {
    array(field(record, "entries")?, "AResultEntry")?
        .iter()
        .map(|entry| {
            Ok(Cell {
                value: bytes(field(entry, "value")?)?,
                timestamp: optional(entry, "timestamp").and_then(long).unwrap_or(0),
            })
        })
        .collect()
}

fn scanner_id(response: &Value) -> Result<i32> {
    match unwrap(response) {
        Value::Int(id) => Ok(*id),
        Value::Long(id) => i32::try_from(*id)
            .map_err(|_| HBaseError::Malformed(format!("scanner id {} out of range", id))),
        other => Err(HBaseError::Malformed(format!("expected scanner id, got {:?}", other))),
    }
}

/// Map the response datum of `call` onto the shared reply model
pub fn decode_response(call: &Call, response: &Value) -> Result<Reply> {
    let reply = match call {
        Call::GetTableNames => Reply::Names(
            array(response, "ATableDescriptor")?
                .iter()
                .map(|t| text(field(t, "name")?))
                .collect::<Result<_>>()?,
        ),
        Call::GetColumnDescriptors { .. } => match optional(response, "families") {
            Some(families) => Reply::Families(
                array(families, "AFamilyDescriptor")?
                    .iter()
                    .map(decode_family)
                    .collect::<Result<_>>()?,
            ),
            None => Reply::Families(Vec::new()),
        },
        Call::DescribeFamily { .. } => Reply::Family(decode_family(response)?),
        Call::IsTableEnabled { .. } => match unwrap(response) {
            Value::Boolean(b) => Reply::Bool(*b),
            other => return Err(HBaseError::Malformed(format!("expected boolean, got {:?}", other))),
        },
        Call::GetRow { .. } => {
            let result = decode_result(response)?;
            if result.columns.is_empty() {
                Reply::Rows(Vec::new())
            } else {
                Reply::Rows(vec![result])
            }
        }
        Call::GetVersions { .. } => Reply::Cells(decode_cells(response)?),
        Call::ScannerOpen { .. } => Reply::ScannerId(scanner_id(response)?),
        Call::ScannerGetList { .. } => Reply::Rows(
            array(response, "AResult")?
                .iter()
                .map(decode_result)
                .collect::<Result<_>>()?,
        ),
        _ => Reply::Unit,
    };
    Ok(reply)
}

/// Map an error-union datum onto the client error model
///
/// `names` holds the error type name of each union branch.
pub fn decode_error(names: &[String], datum: &Value) -> HBaseError {
    let (index, body) = match datum {
        Value::Union(i, inner) => (usize::try_from(*i).unwrap_or(usize::MAX), inner.as_ref()),
        other => (0, other),
    };
    let kind = names.get(index).map(String::as_str).unwrap_or("string");
    let message = match body {
        Value::String(s) => s.clone(),
        other => match field(other, "message") {
            Ok(Value::String(s)) => s.clone(),
            _ => format!("{:?}", other),
        },
    };

    match kind {
        "AIOError" => HBaseError::Remote(message),
        "AIllegalArgument" => HBaseError::IllegalArgument(message),
        "ATableExists" => HBaseError::AlreadyExists(message),
        "string" => HBaseError::Application {
            kind: "AvroRemoteException".to_string(),
            message,
        },
        other => HBaseError::Application {
            kind: other.to_string(),
            message,
        },
    }
}
