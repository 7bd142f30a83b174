//! Remote procedure model shared by every transport
//!
//! A [`Call`] is exactly one round trip to the gateway. An [`Operation`] is
//! the unit the connection's retry policy wraps: usually a single call, or
//! the open/fetch/close sequence of a scan.

use crate::error::{HBaseError, Result};
use crate::types::{Cell, Column, ColumnDescriptor, Mutation, RegionInfo, RowResult};
use bytes::Bytes;

/// One remote procedure invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetTableNames,
    GetColumnDescriptors { table: String },
    DescribeFamily { table: String, family: String },
    GetTableRegions { table: String },
    IsTableEnabled { table: String },
    CreateTable { table: String, families: Vec<ColumnDescriptor> },
    EnableTable { table: String },
    DisableTable { table: String },
    DeleteTable { table: String },
    Compact { table: String },
    MajorCompact { table: String },
    /// Whole row when `columns` is empty
    GetRow { table: String, row: Bytes, columns: Vec<Column> },
    GetVersions { table: String, row: Bytes, column: Column, versions: i32 },
    MutateRow { table: String, row: Bytes, mutations: Vec<Mutation> },
    DeleteAll { table: String, row: Bytes, column: Column },
    DeleteAllRow { table: String, row: Bytes },
    ScannerOpen { table: String, start_row: Bytes, columns: Vec<Column> },
    ScannerGetList { id: i32, rows: i32 },
    ScannerClose { id: i32 },
}

impl Call {
    /// Remote method name on the Thrift wire
    pub fn name(&self) -> &'static str {
        match self {
            Call::GetTableNames => "getTableNames",
            Call::GetColumnDescriptors { .. } | Call::DescribeFamily { .. } => "getColumnDescriptors",
            Call::GetTableRegions { .. } => "getTableRegions",
            Call::IsTableEnabled { .. } => "isTableEnabled",
            Call::CreateTable { .. } => "createTable",
            Call::EnableTable { .. } => "enableTable",
            Call::DisableTable { .. } => "disableTable",
            Call::DeleteTable { .. } => "deleteTable",
            Call::Compact { .. } => "compact",
            Call::MajorCompact { .. } => "majorCompact",
            Call::GetRow { columns, .. } if columns.is_empty() => "getRow",
            Call::GetRow { .. } => "getRowWithColumns",
            Call::GetVersions { .. } => "getVer",
            Call::MutateRow { .. } => "mutateRow",
            Call::DeleteAll { .. } => "deleteAll",
            Call::DeleteAllRow { .. } => "deleteAllRow",
            Call::ScannerOpen { .. } => "scannerOpen",
            Call::ScannerGetList { .. } => "scannerGetList",
            Call::ScannerClose { .. } => "scannerClose",
        }
    }
}

/// Decoded response of one call
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Unit,
    Bool(bool),
    Names(Vec<String>),
    Families(Vec<ColumnDescriptor>),
    Family(ColumnDescriptor),
    Regions(Vec<RegionInfo>),
    Cells(Vec<Cell>),
    Rows(Vec<RowResult>),
    ScannerId(i32),
}

impl Reply {
    fn mismatch(self, call: &'static str) -> HBaseError {
        HBaseError::UnexpectedReply {
            call,
            reply: format!("{:?}", self),
        }
    }

    pub fn into_unit(self, call: &'static str) -> Result<()> {
        match self {
            Reply::Unit => Ok(()),
            other => Err(other.mismatch(call)),
        }
    }

    pub fn into_bool(self, call: &'static str) -> Result<bool> {
        match self {
            Reply::Bool(b) => Ok(b),
            other => Err(other.mismatch(call)),
        }
    }

    pub fn into_names(self, call: &'static str) -> Result<Vec<String>> {
        match self {
            Reply::Names(names) => Ok(names),
            other => Err(other.mismatch(call)),
        }
    }

    pub fn into_families(self, call: &'static str) -> Result<Vec<ColumnDescriptor>> {
        match self {
            Reply::Families(families) => Ok(families),
            other => Err(other.mismatch(call)),
        }
    }

    pub fn into_family(self, call: &'static str) -> Result<ColumnDescriptor> {
        match self {
            Reply::Family(family) => Ok(family),
            other => Err(other.mismatch(call)),
        }
    }

    pub fn into_regions(self, call: &'static str) -> Result<Vec<RegionInfo>> {
        match self {
            Reply::Regions(regions) => Ok(regions),
            other => Err(other.mismatch(call)),
        }
    }

    pub fn into_cells(self, call: &'static str) -> Result<Vec<Cell>> {
        match self {
            Reply::Cells(cells) => Ok(cells),
            other => Err(other.mismatch(call)),
        }
    }

    pub fn into_rows(self, call: &'static str) -> Result<Vec<RowResult>> {
        match self {
            Reply::Rows(rows) => Ok(rows),
            other => Err(other.mismatch(call)),
        }
    }

    pub fn into_scanner_id(self, call: &'static str) -> Result<i32> {
        match self {
            Reply::ScannerId(id) => Ok(id),
            other => Err(other.mismatch(call)),
        }
    }
}

/// Unit of work retried as a whole by the connection
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Call(Call),
    Scan {
        table: String,
        start_row: Bytes,
        columns: Vec<Column>,
        rows: i32,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Call(call) => call.name(),
            Operation::Scan { .. } => "scan",
        }
    }
}

impl From<Call> for Operation {
    fn from(call: Call) -> Self {
        Operation::Call(call)
    }
}
