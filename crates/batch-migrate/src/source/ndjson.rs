//! Newline-delimited JSON row input.
//!
//! Each non-blank line holds one row in either form:
//!
//! ```text
//! {"table": "users", "columns": ["id", "name"], "values": [1, "ann"]}
//! {"table": "users", "row": {"id": 1, "name": "ann"}}
//! ```
//!
//! With the `row` form columns are sorted by name.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::{Row, SqlNullType, SqlValue};
use crate::error::{MigrateError, Result};

#[derive(Debug, Deserialize)]
struct InputRecord {
    table: String,
    #[serde(default)]
    columns: Option<Vec<String>>,
    #[serde(default)]
    values: Option<Vec<Value>>,
    #[serde(default)]
    row: Option<Map<String, Value>>,
}

/// Streaming reader of NDJSON rows.
pub struct NdjsonReader<R> {
    lines: Lines<BufReader<R>>,
    line_no: usize,
}

impl NdjsonReader<File> {
    /// Open an NDJSON file.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).await?;
        Ok(Self::new(file))
    }
}

impl<R: AsyncRead + Unpin> NdjsonReader<R> {
    /// Wrap any async byte source.
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            line_no: 0,
        }
    }

    /// Read the next row, or `None` at end of input.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return parse_line(line, self.line_no).map(Some);
        }
        Ok(None)
    }

    /// Lines consumed so far, including blank ones.
    pub fn line_number(&self) -> usize {
        self.line_no
    }
}

impl<R: AsyncRead + Unpin + Send + 'static> NdjsonReader<R> {
    /// Read rows on a background task into a bounded channel.
    ///
    /// The channel provides backpressure: the reader stalls while `buffer`
    /// rows are waiting. Reading stops after the first error, which is sent
    /// as the last item.
    pub fn spawn(mut self, buffer: usize) -> mpsc::Receiver<Result<Row>> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        tokio::spawn(async move {
            loop {
                let item = match self.next_row().await {
                    Ok(Some(row)) => Ok(row),
                    Ok(None) => break,
                    Err(e) => Err(e),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
            debug!("Input reader finished after {} lines", self.line_no);
        });
        rx
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<Row> {
    let record: InputRecord =
        serde_json::from_str(line).map_err(|e| MigrateError::input(line_no, e.to_string()))?;

    let (columns, values) = match (record.columns, record.values, record.row) {
        (Some(columns), Some(values), None) => {
            if columns.len() != values.len() {
                return Err(MigrateError::input(
                    line_no,
                    format!(
                        "{} columns but {} values",
                        columns.len(),
                        values.len()
                    ),
                ));
            }
            (columns, values)
        }
        (None, None, Some(row)) => row.into_iter().unzip(),
        _ => {
            return Err(MigrateError::input(
                line_no,
                "expected either \"columns\" with \"values\" or \"row\"",
            ))
        }
    };

    Ok(Row::new(
        record.table,
        columns,
        values.into_iter().map(json_to_value).collect(),
    ))
}

/// Map a JSON value onto the closest target value.
fn json_to_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null(SqlNullType::Text),
        Value::Bool(b) => SqlValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::I64(i),
            None => SqlValue::F64(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s),
        other @ (Value::Array(_) | Value::Object(_)) => SqlValue::Json(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_all(input: &'static str) -> Result<Vec<Row>> {
        let mut reader = NdjsonReader::new(input.as_bytes());
        let mut rows = Vec::new();
        while let Some(row) = reader.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    #[tokio::test]
    async fn test_columns_values_form() {
        let rows = read_all(r#"{"table": "t", "columns": ["a", "b"], "values": [1, "x"]}"#)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].table(), "t");
        assert_eq!(rows[0].columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(rows[0].values(), &[SqlValue::I64(1), SqlValue::from("x")]);
    }

    #[tokio::test]
    async fn test_row_form_and_blank_lines() {
        let input = "\n{\"table\": \"t\", \"row\": {\"b\": 2.5, \"a\": null}}\n\n";
        let mut reader = NdjsonReader::new(input.as_bytes());
        let row = reader.next_row().await.unwrap();
        assert_eq!(reader.line_number(), 2);
        assert!(reader.next_row().await.unwrap().is_none());
        assert_eq!(reader.line_number(), 3);

        let rows: Vec<Row> = row.into_iter().collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(
            rows[0].values(),
            &[SqlValue::Null(SqlNullType::Text), SqlValue::F64(2.5)]
        );
    }

    #[tokio::test]
    async fn test_nested_values_become_json() {
        let rows = read_all(r#"{"table": "t", "columns": ["tags"], "values": [["a", "b"]]}"#)
            .await
            .unwrap();
        assert_eq!(rows[0].values(), &[SqlValue::Json(r#"["a","b"]"#.to_string())]);
    }

    #[tokio::test]
    async fn test_length_mismatch_reports_line() {
        let input = "{\"table\": \"t\", \"columns\": [\"a\"], \"values\": [1]}\n\
                     {\"table\": \"t\", \"columns\": [\"a\"], \"values\": [1, 2]}\n";
        let err = read_all(input).await.unwrap_err();
        match err {
            MigrateError::Input { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let err = read_all("{not json").await.unwrap_err();
        assert!(matches!(err, MigrateError::Input { line: 1, .. }));
    }

    #[tokio::test]
    async fn test_spawn_streams_rows_then_error() {
        let input = "{\"table\": \"t\", \"row\": {\"a\": 1}}\n\
                     {\"table\": \"t\", \"row\": {\"a\": 2}}\n\
                     {\"table\": \"t\"}\n\
                     {\"table\": \"t\", \"row\": {\"a\": 3}}\n";
        let mut rx = NdjsonReader::new(input.as_bytes()).spawn(1);
        assert!(rx.recv().await.unwrap().is_ok());
        assert!(rx.recv().await.unwrap().is_ok());
        assert!(rx.recv().await.unwrap().is_err());
        assert!(rx.recv().await.is_none());
    }
}
