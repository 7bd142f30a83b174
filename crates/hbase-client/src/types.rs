//! Row, cell and schema types exchanged with the gateway

use crate::error::HBaseError;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Row flattened to `family:qualifier -> value`
pub type Row = BTreeMap<String, Bytes>;

/// Row flattened to `family:qualifier -> (value, timestamp)`
pub type TimestampedRow = BTreeMap<String, (Bytes, i64)>;

/// Two-part column identifier (`family:qualifier`)
///
/// A bare `family` addresses the whole column family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    pub family: String,
    pub qualifier: Option<String>,
}

impl Column {
    pub fn new(family: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            qualifier: Some(qualifier.into()),
        }
    }

    pub fn family(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            qualifier: None,
        }
    }
}

impl FromStr for Column {
    type Err = HBaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (family, qualifier) = match s.split_once(':') {
            Some((family, qualifier)) => (family, Some(qualifier.to_string())),
            None => (s, None),
        };
        if family.is_empty() {
            return Err(HBaseError::InvalidArgument(format!(
                "column '{}' has an empty family",
                s
            )));
        }
        Ok(Self {
            family: family.to_string(),
            qualifier,
        })
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}:{}", self.family, q),
            None => f.write_str(&self.family),
        }
    }
}

/// A single versioned cell value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub value: Bytes,
    pub timestamp: i64,
}

/// A row as returned by row reads and scanners
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowResult {
    pub row: Bytes,
    pub columns: BTreeMap<String, Cell>,
}

impl RowResult {
    /// Drop timestamps, keeping `column -> value`
    pub fn into_values(self) -> Row {
        self.columns.into_iter().map(|(k, c)| (k, c.value)).collect()
    }

    /// Keep `column -> (value, timestamp)`
    pub fn into_timestamped(self) -> TimestampedRow {
        self.columns
            .into_iter()
            .map(|(k, c)| (k, (c.value, c.timestamp)))
            .collect()
    }
}

/// A single column change within a row mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub is_delete: bool,
    pub column: Column,
    pub value: Bytes,
}

impl Mutation {
    pub fn put(column: Column, value: impl Into<Bytes>) -> Self {
        Self {
            is_delete: false,
            column,
            value: value.into(),
        }
    }

    pub fn delete(column: Column) -> Self {
        Self {
            is_delete: true,
            column,
            value: Bytes::new(),
        }
    }
}

/// Column family schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub max_versions: i32,
    pub compression: String,
    pub in_memory: bool,
    pub bloom_filter_type: String,
    pub bloom_filter_vector_size: i32,
    pub bloom_filter_nb_hashes: i32,
    pub block_cache_enabled: bool,
    pub time_to_live: i32,
}

impl Default for ColumnDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_versions: 3,
            compression: "NONE".to_string(),
            in_memory: false,
            bloom_filter_type: "NONE".to_string(),
            bloom_filter_vector_size: 0,
            bloom_filter_nb_hashes: 0,
            block_cache_enabled: false,
            time_to_live: -1,
        }
    }
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Family name without the trailing `:` the Thrift gateway reports
    pub fn family(&self) -> &str {
        self.name.strip_suffix(':').unwrap_or(&self.name)
    }
}

/// Region boundaries and identity
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegionInfo {
    pub start_key: Bytes,
    pub end_key: Bytes,
    pub id: i64,
    pub name: Bytes,
    pub version: i8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_parsing() {
        let c: Column = "info:name".parse().unwrap();
        assert_eq!(c, Column::new("info", "name"));
        assert_eq!(c.to_string(), "info:name");

        let c: Column = "info".parse().unwrap();
        assert_eq!(c, Column::family("info"));
        assert_eq!(c.to_string(), "info");

        // Only the first ':' separates family from qualifier
        let c: Column = "info:a:b".parse().unwrap();
        assert_eq!(c.qualifier.as_deref(), Some("a:b"));

        // Trailing ':' keeps an empty qualifier
        let c: Column = "info:".parse().unwrap();
        assert_eq!(c.qualifier.as_deref(), Some(""));
        assert_eq!(c.to_string(), "info:");

        assert!(":name".parse::<Column>().is_err());
        assert!("".parse::<Column>().is_err());
    }

    #[test]
    fn test_row_flattening() {
        let mut columns = BTreeMap::new();
        columns.insert("f:a".to_string(), Cell { value: Bytes::from_static(b"1"), timestamp: 10 });
        columns.insert("f:b".to_string(), Cell { value: Bytes::from_static(b"2"), timestamp: 20 });
        let row = RowResult { row: Bytes::from_static(b"r"), columns };

        let values = row.clone().into_values();
        assert_eq!(values.len(), 2);
        assert_eq!(values["f:a"], Bytes::from_static(b"1"));
        assert_eq!(values["f:b"], Bytes::from_static(b"2"));

        let stamped = row.into_timestamped();
        assert_eq!(stamped["f:a"], (Bytes::from_static(b"1"), 10));
        assert_eq!(stamped["f:b"], (Bytes::from_static(b"2"), 20));
    }

    #[test]
    fn test_descriptor_defaults() {
        let d = ColumnDescriptor::new("info:");
        assert_eq!(d.max_versions, 3);
        assert_eq!(d.compression, "NONE");
        assert_eq!(d.time_to_live, -1);
        assert_eq!(d.family(), "info");
    }
}
