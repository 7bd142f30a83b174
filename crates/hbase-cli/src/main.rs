//! hbase - command-line client for HBase gateways
//!
//! Usage:
//!   hbase [-h HOST[:PORT]] show_tables
//!   hbase describe_table <table>
//!   hbase get <table> <row> [column...]
//!   hbase put <table> <row> <family> <column> <value>
//!   hbase scan <table> <start_row> <column_or_family> <n>
//!   hbase --help                      Full command list
//!
//! Exit status is 0 on success or help, 1 on a usage error.

mod commands;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;
use commands::Cli;
use hbase_client::Connection;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    // Arguments are validated before any connection is attempted
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_logging(&cli.log_level);

    let config = cli.config();
    debug!(peer = %config.address(), protocol = %config.protocol, "connecting");
    let mut conn = Connection::open(config).await?;

    commands::execute(&mut conn, cli.command).await?;
    conn.close().await?;
    Ok(())
}

/// Log to stderr so stdout only carries results. `RUST_LOG` wins over `level`.
fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok();
}
