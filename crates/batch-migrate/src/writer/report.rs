//! Post-flush summary of a write run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::BatchWriter;
use crate::error::Result;

/// Number of bad rows copied into a report.
pub const REPORT_SAMPLE_ROWS: usize = 20;

/// Summary of a completed write run, suitable for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Hash of the configuration the run used.
    pub config_hash: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the writer was flushed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Rows handed to the writer.
    pub rows_added: i64,

    /// Rows the backend accepted.
    pub rows_written: i64,

    /// Rows permanently abandoned.
    pub rows_dropped: i64,

    /// Average write throughput (rows/second).
    pub rows_per_second: i64,

    /// Split-retry attempts consumed.
    pub retries_consumed: u64,

    /// Dropped rows per target table.
    pub dropped_by_table: BTreeMap<String, i64>,

    /// Failed write counts per error message.
    pub errors: BTreeMap<String, i64>,

    /// Rows that failed on their own.
    pub bad_row_sample: Vec<String>,
}

impl WriteReport {
    /// Build a report from a flushed writer.
    pub fn from_writer(writer: &BatchWriter, config_hash: impl Into<String>) -> Self {
        let started_at = writer.started_at();
        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let rows_written = writer.rows_written();
        let rows_per_second = if duration_seconds > 0.0 {
            (rows_written as f64 / duration_seconds) as i64
        } else {
            0
        };

        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            config_hash: config_hash.into(),
            started_at,
            completed_at,
            duration_seconds,
            rows_added: writer.rows_added(),
            rows_written,
            rows_dropped: writer.rows_dropped(),
            rows_per_second,
            retries_consumed: writer.retries_consumed(),
            dropped_by_table: writer.dropped_rows_by_table().into_iter().collect(),
            errors: writer.errors().into_iter().collect(),
            bad_row_sample: writer.sample_bad_rows(REPORT_SAMPLE_ROWS),
        }
    }

    /// Whether every added row was written.
    pub fn is_complete(&self) -> bool {
        self.rows_dropped == 0 && self.rows_written == self.rows_added
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::DiscardSink;
    use crate::writer::BatchWriterConfig;
    use crate::SqlValue;

    #[tokio::test]
    async fn test_report_from_clean_run() {
        let mut writer = BatchWriter::new(DiscardSink::new(), BatchWriterConfig::default());
        for i in 0..10 {
            writer
                .add_row("items", vec!["id".to_string()], vec![SqlValue::I64(i)])
                .await;
        }
        writer.flush().await;

        let report = writer.report("abc123");
        assert!(report.completed_at >= report.started_at);
        assert!(report.is_complete());
        assert_eq!(report.rows_added, 10);
        assert_eq!(report.rows_written, 10);
        assert!(report.errors.is_empty());

        let json = report.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["config_hash"], "abc123");
        assert_eq!(parsed["rows_dropped"], 0);
    }
}
