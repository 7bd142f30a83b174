//! Server-side cursor handling
//!
//! A scanner never outlives the [`scan`] call that opened it.

use crate::error::Result;
use crate::rpc::Call;
use crate::transport::Transport;
use crate::types::{Column, RowResult};
use bytes::Bytes;
use tracing::{debug, warn};

/// Open a scanner at `start_row`, fetch up to `rows` rows, then close it.
///
/// The close is attempted on every path. A fetch error takes precedence
/// over a close error; a close error after a successful fetch is returned.
pub async fn scan(
    transport: &mut dyn Transport,
    table: &str,
    start_row: Bytes,
    columns: Vec<Column>,
    rows: i32,
) -> Result<Vec<RowResult>> {
    let id = transport
        .call(&Call::ScannerOpen {
            table: table.to_string(),
            start_row,
            columns,
        })
        .await?
        .into_scanner_id("scannerOpen")?;
    debug!(table, scanner = id, "scanner open");

    let fetched = match transport.call(&Call::ScannerGetList { id, rows }).await {
        Ok(reply) => reply.into_rows("scannerGetList"),
        Err(e) => Err(e),
    };
    let closed = transport.call(&Call::ScannerClose { id }).await;

    match (fetched, closed) {
        (Ok(rows), Ok(reply)) => {
            reply.into_unit("scannerClose")?;
            Ok(rows)
        }
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(scanner = id, error = %close_err, "scanner close failed after fetch error");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HBaseError;
    use crate::rpc::Reply;
    use crate::types::Cell;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Records calls and answers from a fixed script
    struct Scripted {
        calls: Vec<Call>,
        replies: VecDeque<Result<Reply>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Reply>>) -> Self {
            Self {
                calls: Vec::new(),
                replies: replies.into(),
            }
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn call(&mut self, call: &Call) -> Result<Reply> {
            self.calls.push(call.clone());
            self.replies.pop_front().unwrap_or(Err(HBaseError::NotConnected))
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn one_row() -> Vec<RowResult> {
        let mut row = RowResult {
            row: Bytes::from_static(b"r1"),
            ..Default::default()
        };
        row.columns.insert(
            "f:a".into(),
            Cell {
                value: Bytes::from_static(b"1"),
                timestamp: 3,
            },
        );
        vec![row]
    }

    #[tokio::test]
    async fn test_open_fetch_close_in_order() {
        let mut transport = Scripted::new(vec![
            Ok(Reply::ScannerId(42)),
            Ok(Reply::Rows(one_row())),
            Ok(Reply::Unit),
        ]);

        let rows = scan(&mut transport, "t", Bytes::from_static(b"r"), vec![Column::family("f")], 5)
            .await
            .unwrap();

        assert_eq!(rows, one_row());
        assert_eq!(
            transport.calls,
            vec![
                Call::ScannerOpen {
                    table: "t".into(),
                    start_row: Bytes::from_static(b"r"),
                    columns: vec![Column::family("f")],
                },
                Call::ScannerGetList { id: 42, rows: 5 },
                Call::ScannerClose { id: 42 },
            ]
        );
    }

    #[tokio::test]
    async fn test_close_runs_when_fetch_fails() {
        let mut transport = Scripted::new(vec![
            Ok(Reply::ScannerId(7)),
            Err(HBaseError::Remote("region moved".into())),
            Ok(Reply::Unit),
        ]);

        let err = scan(&mut transport, "t", Bytes::new(), vec![], 1).await.unwrap_err();

        assert!(matches!(err, HBaseError::Remote(_)));
        assert_eq!(transport.calls.last(), Some(&Call::ScannerClose { id: 7 }));
    }

    #[tokio::test]
    async fn test_fetch_error_wins_over_close_error() {
        let mut transport = Scripted::new(vec![
            Ok(Reply::ScannerId(7)),
            Err(HBaseError::Remote("fetch".into())),
            Err(HBaseError::Remote("close".into())),
        ]);

        let err = scan(&mut transport, "t", Bytes::new(), vec![], 1).await.unwrap_err();
        assert!(matches!(err, HBaseError::Remote(ref m) if m == "fetch"));
    }

    #[tokio::test]
    async fn test_close_error_after_fetch_is_returned() {
        let mut transport = Scripted::new(vec![
            Ok(Reply::ScannerId(7)),
            Ok(Reply::Rows(one_row())),
            Err(HBaseError::IllegalArgument("unknown scanner".into())),
        ]);

        let err = scan(&mut transport, "t", Bytes::new(), vec![], 1).await.unwrap_err();
        assert!(matches!(err, HBaseError::IllegalArgument(_)));
    }

    #[tokio::test]
    async fn test_open_failure_skips_fetch() {
        let mut transport = Scripted::new(vec![Err(HBaseError::Remote("no table".into()))]);

        assert!(scan(&mut transport, "t", Bytes::new(), vec![], 1).await.is_err());
        assert_eq!(transport.calls.len(), 1);
    }
}
