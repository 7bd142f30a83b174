//! Reconnecting client connection
//!
//! [`Connection`] owns at most one open [`Transport`] and exposes one method
//! per gateway operation. Every operation runs under the same policy: a
//! transient failure closes the transport, reconnects and retries once.

use crate::config::ConnectionConfig;
use crate::error::{HBaseError, Result};
use crate::rpc::{Call, Operation, Reply};
use crate::scanner;
use crate::transport::{DefaultFactory, Transport, TransportFactory};
use crate::types::{Cell, Column, ColumnDescriptor, Mutation, RegionInfo, Row, RowResult, TimestampedRow};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

/// Client handle to a single gateway endpoint
pub struct Connection {
    config: ConnectionConfig,
    factory: Arc<dyn TransportFactory>,
    transport: Option<Box<dyn Transport>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Connection {
    /// Connect using the transport stack selected by `config.protocol`
    pub async fn open(config: ConnectionConfig) -> Result<Self> {
        Self::with_factory(config, Arc::new(DefaultFactory)).await
    }

    /// Connect using a caller-supplied transport factory
    pub async fn with_factory(config: ConnectionConfig, factory: Arc<dyn TransportFactory>) -> Result<Self> {
        let mut conn = Self {
            config,
            factory,
            transport: None,
        };
        conn.reconnect().await?;
        Ok(conn)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Whether a transport is currently installed
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Close the transport. Closing an already closed connection is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        match self.transport.take() {
            Some(mut transport) => {
                debug!(peer = %self.config.address(), "closing connection");
                transport.close().await
            }
            None => Ok(()),
        }
    }

    // Metadata

    pub async fn list_tables(&mut self) -> Result<Vec<String>> {
        self.execute(Call::GetTableNames.into())
            .await?
            .into_names("list_tables")
    }

    /// Alias of [`Connection::list_tables`]
    pub async fn show_tables(&mut self) -> Result<Vec<String>> {
        self.list_tables().await
    }

    pub async fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        self.execute(
            Call::GetColumnDescriptors {
                table: table.to_string(),
            }
            .into(),
        )
        .await?
        .into_families("describe_table")
    }

    pub async fn describe_family(&mut self, table: &str, family: &str) -> Result<ColumnDescriptor> {
        self.execute(
            Call::DescribeFamily {
                table: table.to_string(),
                family: family.to_string(),
            }
            .into(),
        )
        .await?
        .into_family("describe_family")
    }

    pub async fn get_table_regions(&mut self, table: &str) -> Result<Vec<RegionInfo>> {
        self.execute(
            Call::GetTableRegions {
                table: table.to_string(),
            }
            .into(),
        )
        .await?
        .into_regions("get_table_regions")
    }

    pub async fn is_table_enabled(&mut self, table: &str) -> Result<bool> {
        self.execute(
            Call::IsTableEnabled {
                table: table.to_string(),
            }
            .into(),
        )
        .await?
        .into_bool("is_table_enabled")
    }

    // Administration

    /// Create `table` with one default-configured descriptor per family name
    pub async fn create_table(&mut self, table: &str, families: &[String]) -> Result<()> {
        let families = families
            .iter()
            .map(|f| ColumnDescriptor::new(format!("{}:", f.trim_end_matches(':'))))
            .collect();
        self.execute(
            Call::CreateTable {
                table: table.to_string(),
                families,
            }
            .into(),
        )
        .await?
        .into_unit("create_table")
    }

    pub async fn enable_table(&mut self, table: &str) -> Result<()> {
        let call = Call::EnableTable {
            table: table.to_string(),
        };
        self.execute(call.into()).await?.into_unit("enable_table")
    }

    pub async fn disable_table(&mut self, table: &str) -> Result<()> {
        let call = Call::DisableTable {
            table: table.to_string(),
        };
        self.execute(call.into()).await?.into_unit("disable_table")
    }

    pub async fn delete_table(&mut self, table: &str) -> Result<()> {
        let call = Call::DeleteTable {
            table: table.to_string(),
        };
        self.execute(call.into()).await?.into_unit("delete_table")
    }

    pub async fn compact(&mut self, table: &str) -> Result<()> {
        let call = Call::Compact {
            table: table.to_string(),
        };
        self.execute(call.into()).await?.into_unit("compact")
    }

    pub async fn major_compact(&mut self, table: &str) -> Result<()> {
        let call = Call::MajorCompact {
            table: table.to_string(),
        };
        self.execute(call.into()).await?.into_unit("major_compact")
    }

    // Reads

    /// Latest cells of `row` as `column -> (value, timestamp)`.
    ///
    /// An empty `columns` reads every column. A missing row is an empty map.
    pub async fn get(&mut self, table: &str, row: &[u8], columns: &[Column]) -> Result<TimestampedRow> {
        let rows = self
            .execute(
                Call::GetRow {
                    table: table.to_string(),
                    row: Bytes::copy_from_slice(row),
                    columns: columns.to_vec(),
                }
                .into(),
            )
            .await?
            .into_rows("get")?;
        Ok(rows
            .into_iter()
            .next()
            .map(RowResult::into_timestamped)
            .unwrap_or_default())
    }

    /// Every column of `row`, values only
    pub async fn get_full_row(&mut self, table: &str, row: &[u8]) -> Result<Vec<Row>> {
        let rows = self
            .execute(
                Call::GetRow {
                    table: table.to_string(),
                    row: Bytes::copy_from_slice(row),
                    columns: Vec::new(),
                }
                .into(),
            )
            .await?
            .into_rows("get_full_row")?;
        Ok(rows.into_iter().map(RowResult::into_values).collect())
    }

    /// Up to `versions` versions of one cell, newest first
    pub async fn get_cell_versions(
        &mut self,
        table: &str,
        row: &[u8],
        column: &Column,
        versions: i32,
    ) -> Result<Vec<Cell>> {
        self.execute(
            Call::GetVersions {
                table: table.to_string(),
                row: Bytes::copy_from_slice(row),
                column: column.clone(),
                versions,
            }
            .into(),
        )
        .await?
        .into_cells("get_cell_versions")
    }

    // Writes

    /// Write `family:qualifier = value` as a single-entry mutation
    pub async fn put(
        &mut self,
        table: &str,
        row: &[u8],
        family: &str,
        qualifier: &str,
        value: &[u8],
    ) -> Result<()> {
        let mutation = Mutation::put(Column::new(family, qualifier), Bytes::copy_from_slice(value));
        self.execute(
            Call::MutateRow {
                table: table.to_string(),
                row: Bytes::copy_from_slice(row),
                mutations: vec![mutation],
            }
            .into(),
        )
        .await?
        .into_unit("put")
    }

    pub async fn delete_row(&mut self, table: &str, row: &[u8]) -> Result<()> {
        self.execute(
            Call::DeleteAllRow {
                table: table.to_string(),
                row: Bytes::copy_from_slice(row),
            }
            .into(),
        )
        .await?
        .into_unit("delete_row")
    }

    /// Delete every version of one column (or a whole family) in `row`
    pub async fn delete_cells(&mut self, table: &str, row: &[u8], column: &Column) -> Result<()> {
        self.execute(
            Call::DeleteAll {
                table: table.to_string(),
                row: Bytes::copy_from_slice(row),
                column: column.clone(),
            }
            .into(),
        )
        .await?
        .into_unit("delete_cells")
    }

    /// Fetch up to `rows` rows starting at `start_row`
    pub async fn scan(
        &mut self,
        table: &str,
        start_row: &[u8],
        columns: &[Column],
        rows: i32,
    ) -> Result<Vec<RowResult>> {
        self.execute(Operation::Scan {
            table: table.to_string(),
            start_row: Bytes::copy_from_slice(start_row),
            columns: columns.to_vec(),
            rows,
        })
        .await?
        .into_rows("scan")
    }

    // Retry machinery

    /// Run `op`, reconnecting and retrying once on a transient failure.
    ///
    /// A second transient failure leaves the connection closed; the next
    /// operation reconnects.
    pub async fn execute(&mut self, op: Operation) -> Result<Reply> {
        if self.transport.is_none() {
            self.reconnect().await?;
        }

        match self.run_once(&op).await {
            Err(e) if e.is_transient() => {
                warn!(operation = op.name(), error = %e, "transient failure, reconnecting");
                self.discard_transport().await;
                self.reconnect().await?;

                let retried = self.run_once(&op).await;
                if let Err(e) = &retried {
                    if e.is_transient() {
                        warn!(operation = op.name(), error = %e, "retry failed, connection closed");
                        self.discard_transport().await;
                    }
                }
                retried
            }
            other => other,
        }
    }

    async fn run_once(&mut self, op: &Operation) -> Result<Reply> {
        let transport = self.transport.as_mut().ok_or(HBaseError::NotConnected)?;
        match op {
            Operation::Call(call) => transport.call(call).await,
            Operation::Scan {
                table,
                start_row,
                columns,
                rows,
            } => scanner::scan(&mut **transport, table, start_row.clone(), columns.clone(), *rows)
                .await
                .map(Reply::Rows),
        }
    }

    /// Connect with the attempt budget, reporting exhaustion as `Connection`
    async fn reconnect(&mut self) -> Result<()> {
        self.connect()
            .await
            .map_err(|e| HBaseError::connection(&self.config.host, self.config.port, e))
    }

    /// Replace any prior transport with a fresh one.
    ///
    /// Attempts are made back to back; exhaustion returns the last error.
    async fn connect(&mut self) -> Result<()> {
        self.discard_transport().await;

        let attempts = self.config.connect_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            debug!(peer = %self.config.address(), protocol = %self.config.protocol, attempt, "connecting");
            match self.factory.open(&self.config).await {
                Ok(transport) => {
                    self.transport = Some(transport);
                    return Ok(());
                }
                Err(e) => {
                    debug!(attempt, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(HBaseError::NotConnected))
    }

    /// Best-effort close; errors are logged and dropped
    async fn discard_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!(error = %e, "ignoring close failure on discarded transport");
            }
        }
    }
}
