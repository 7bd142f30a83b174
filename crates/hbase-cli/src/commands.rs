//! Argument model and dispatch

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use hbase_client::{Column, Connection, ConnectionConfig, Protocol, DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "hbase")]
#[command(about = "Command-line client for HBase Thrift and HTTP gateways", long_about = None)]
#[command(version, disable_help_flag = true, arg_required_else_help = true)]
pub struct Cli {
    /// Gateway endpoint
    #[arg(
        short = 'h',
        long = "host",
        value_name = "HOST[:PORT]",
        default_value = "localhost:9090",
        value_parser = parse_endpoint
    )]
    pub endpoint: Endpoint,

    /// RPC stack spoken by the gateway (thrift, http)
    #[arg(long, default_value = "thrift")]
    pub protocol: Protocol,

    /// Use the framed Thrift transport
    #[arg(long)]
    pub framed: bool,

    /// Connect and per-call timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(self.endpoint.host.clone(), self.endpoint.port)
            .with_protocol(self.protocol)
            .with_framed(self.framed);
        if let Some(secs) = self.timeout {
            let timeout = Duration::from_secs(secs);
            config = config.with_connect_timeout(timeout).with_request_timeout(timeout);
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Parse `host[:port]`; the port defaults to the Thrift gateway port
pub fn parse_endpoint(s: &str) -> std::result::Result<Endpoint, String> {
    let (host, port) = match s.split_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| format!("invalid port '{}'", port))?;
            (host, port)
        }
        None => (s, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err("host must not be empty".to_string());
    }
    Ok(Endpoint {
        host: host.to_string(),
        port,
    })
}

#[derive(Subcommand, Debug, PartialEq)]
#[command(rename_all = "snake_case")]
pub enum Command {
    /// List table names
    #[command(visible_alias = "list_tables")]
    ShowTables,
    /// Show the column families of a table
    DescribeTable { table: String },
    /// Show one column family of a table
    DescribeFamily { table: String, family: String },
    /// List the regions of a table
    GetTableRegions { table: String },
    IsTableEnabled { table: String },
    /// Create a table with default-configured families
    CreateTable { table: String, families: Vec<String> },
    EnableTable { table: String },
    DisableTable { table: String },
    /// Drop a disabled table
    DeleteTable { table: String },
    Compact { table: String },
    MajorCompact { table: String },
    /// Latest cells of a row, optionally restricted to family[:qualifier] columns
    Get {
        table: String,
        row: String,
        columns: Vec<Column>,
    },
    /// Every column value of a row
    GetFullRow { table: String, row: String },
    /// Up to N versions of one cell
    GetCellVersions {
        table: String,
        row: String,
        column: Column,
        n: i32,
    },
    /// Write family:column = value
    Put {
        table: String,
        row: String,
        family: String,
        column: String,
        value: String,
    },
    DeleteRow { table: String, row: String },
    /// Delete every version of one column
    DeleteCells {
        table: String,
        row: String,
        column: Column,
    },
    /// Read N rows starting at start_row
    Scan {
        table: String,
        start_row: String,
        column_or_family: Column,
        n: i32,
    },
}

/// Run one command and print its result
pub async fn execute(conn: &mut Connection, command: Command) -> Result<()> {
    match command {
        Command::ShowTables => println!("{:?}", conn.list_tables().await?),
        Command::DescribeTable { table } => println!("{:?}", conn.describe_table(&table).await?),
        Command::DescribeFamily { table, family } => {
            println!("{:?}", conn.describe_family(&table, &family).await?)
        }
        Command::GetTableRegions { table } => println!("{:?}", conn.get_table_regions(&table).await?),
        Command::IsTableEnabled { table } => println!("{:?}", conn.is_table_enabled(&table).await?),
        Command::CreateTable { table, families } => {
            println!("{:?}", conn.create_table(&table, &families).await?)
        }
        Command::EnableTable { table } => println!("{:?}", conn.enable_table(&table).await?),
        Command::DisableTable { table } => println!("{:?}", conn.disable_table(&table).await?),
        Command::DeleteTable { table } => println!("{:?}", conn.delete_table(&table).await?),
        Command::Compact { table } => println!("{:?}", conn.compact(&table).await?),
        Command::MajorCompact { table } => println!("{:?}", conn.major_compact(&table).await?),
        Command::Get { table, row, columns } => {
            println!("{:?}", conn.get(&table, row.as_bytes(), &columns).await?)
        }
        Command::GetFullRow { table, row } => {
            println!("{:?}", conn.get_full_row(&table, row.as_bytes()).await?)
        }
        Command::GetCellVersions { table, row, column, n } => {
            let cells = conn
                .get_cell_versions(&table, row.as_bytes(), &column, n)
                .await
                .with_context(|| format!("reading versions of {}", column))?;
            println!("{:?}", cells)
        }
        Command::Put {
            table,
            row,
            family,
            column,
            value,
        } => println!(
            "{:?}",
            conn.put(&table, row.as_bytes(), &family, &column, value.as_bytes())
                .await?
        ),
        Command::DeleteRow { table, row } => {
            println!("{:?}", conn.delete_row(&table, row.as_bytes()).await?)
        }
        Command::DeleteCells { table, row, column } => {
            println!("{:?}", conn.delete_cells(&table, row.as_bytes(), &column).await?)
        }
        Command::Scan {
            table,
            start_row,
            column_or_family,
            n,
        } => println!(
            "{:?}",
            conn.scan(&table, start_row.as_bytes(), &[column_or_family], n)
                .await?
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("hbase").chain(args.iter().copied()))
    }

    #[test]
    fn test_default_endpoint() {
        let cli = parse(&["show_tables"]).unwrap();
        assert_eq!(cli.endpoint, Endpoint::default());
        assert_eq!(cli.protocol, Protocol::Thrift);
        assert_eq!(cli.command, Command::ShowTables);
        assert_eq!(cli.config().address(), "localhost:9090");
    }

    #[test]
    fn test_host_flag() {
        let cli = parse(&["-h", "db1:9191", "list_tables"]).unwrap();
        assert_eq!(cli.endpoint, Endpoint { host: "db1".into(), port: 9191 });
        assert_eq!(cli.command, Command::ShowTables);

        let cli = parse(&["-h", "db2", "compact", "t"]).unwrap();
        assert_eq!(cli.endpoint.port, DEFAULT_PORT);
        assert_eq!(cli.command, Command::Compact { table: "t".into() });
    }

    #[test]
    fn test_endpoint_parsing() {
        assert!(parse_endpoint("db:notaport").is_err());
        assert!(parse_endpoint(":9090").is_err());
        assert_eq!(parse_endpoint("db:1").unwrap().port, 1);
    }

    #[test]
    fn test_exact_arity() {
        let err = parse(&["get_full_row", "t"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let err = parse(&["describe_table", "t", "extra"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);

        let err = parse(&["bogus_cmd"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_put_and_scan_arguments() {
        let cli = parse(&["put", "t", "r", "f", "c", "v"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Put {
                table: "t".into(),
                row: "r".into(),
                family: "f".into(),
                column: "c".into(),
                value: "v".into(),
            }
        );

        let cli = parse(&["scan", "t", "r", "f", "5"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Scan {
                table: "t".into(),
                start_row: "r".into(),
                column_or_family: Column::family("f"),
                n: 5,
            }
        );
    }

    #[test]
    fn test_get_columns_are_optional() {
        let cli = parse(&["get", "t", "r"]).unwrap();
        assert!(matches!(cli.command, Command::Get { ref columns, .. } if columns.is_empty()));

        let cli = parse(&["get", "t", "r", "f:a", "g"]).unwrap();
        match cli.command {
            Command::Get { columns, .. } => {
                assert_eq!(columns, vec![Column::new("f", "a"), Column::family("g")])
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_timeout_applies_to_connect_and_calls() {
        let cli = parse(&["--timeout", "3", "--protocol", "http", "show_tables"]).unwrap();
        let config = cli.config();
        assert_eq!(config.protocol, Protocol::Http);
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_help_flag() {
        let err = parse(&["--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }
}
