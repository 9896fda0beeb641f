//! Outcome aggregation shared by concurrent write tasks.

use std::collections::HashMap;

use crate::core::Row;

/// Aggregated outcome of every write attempt.
///
/// Guarded by a single mutex in the engine: each update is a compound
/// map lookup plus conditional append.
#[derive(Debug, Default)]
pub struct WriteStats {
    errors: HashMap<String, i64>,
    dropped: HashMap<String, i64>,
    written: HashMap<String, i64>,
    bad_rows: Vec<Row>,
    bad_row_bytes: usize,
}

impl WriteStats {
    /// Count one occurrence of a failed write with this message.
    pub fn record_error(&mut self, message: &str) {
        *self.errors.entry(message.to_string()).or_insert(0) += 1;
    }

    /// Mark every row of a successful batch as written.
    pub fn record_written(&mut self, rows: &[Row]) {
        for row in rows {
            *self.written.entry(row.table().to_string()).or_insert(0) += 1;
        }
    }

    /// Abandon every row of a batch.
    ///
    /// A batch of exactly one row has been proven bad on its own, so it is
    /// also offered to the sample. The sample keeps its total estimated size
    /// within `sample_byte_limit`, except that the first entry is always kept.
    pub fn record_dropped(&mut self, rows: &[Row], sample_byte_limit: usize) {
        for row in rows {
            *self.dropped.entry(row.table().to_string()).or_insert(0) += 1;
        }

        if let [row] = rows {
            let size = row.byte_size();
            if self.bad_rows.is_empty() || self.bad_row_bytes + size <= sample_byte_limit {
                self.bad_rows.push(row.clone());
                self.bad_row_bytes += size;
            }
        }
    }

    /// Error counts keyed by message.
    pub fn errors(&self) -> HashMap<String, i64> {
        self.errors.clone()
    }

    /// Dropped row counts keyed by table.
    pub fn dropped_rows_by_table(&self) -> HashMap<String, i64> {
        self.dropped.clone()
    }

    /// Written row counts keyed by table.
    pub fn written_rows_by_table(&self) -> HashMap<String, i64> {
        self.written.clone()
    }

    /// Total rows written across tables.
    pub fn rows_written(&self) -> i64 {
        self.written.values().sum()
    }

    /// Total rows dropped across tables.
    pub fn rows_dropped(&self) -> i64 {
        self.dropped.values().sum()
    }

    /// Up to `n` sampled bad rows in diagnostic form.
    pub fn sample_bad_rows(&self, n: usize) -> Vec<String> {
        self.bad_rows.iter().take(n).map(Row::to_string).collect()
    }

    /// Estimated size of the bad-row sample.
    pub fn bad_row_sample_bytes(&self) -> usize {
        self.bad_row_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;

    fn text_row(table: &str, text: &str) -> Row {
        Row::new(table, vec!["v".into()], vec![SqlValue::from(text)])
    }

    #[test]
    fn test_errors_aggregate_by_message() {
        let mut stats = WriteStats::default();
        stats.record_error("boom");
        stats.record_error("boom");
        stats.record_error("other");
        let errors = stats.errors();
        assert_eq!(errors["boom"], 2);
        assert_eq!(errors["other"], 1);
    }

    #[test]
    fn test_multi_row_drop_is_not_sampled() {
        let mut stats = WriteStats::default();
        stats.record_dropped(&[text_row("t", "a"), text_row("t", "b")], 1024);
        assert_eq!(stats.dropped_rows_by_table()["t"], 2);
        assert!(stats.sample_bad_rows(10).is_empty());
    }

    #[test]
    fn test_sample_respects_byte_limit() {
        let mut stats = WriteStats::default();
        let row = text_row("t", "0123456789");
        let size = row.byte_size();
        for _ in 0..5 {
            stats.record_dropped(std::slice::from_ref(&row), size * 2);
        }
        assert_eq!(stats.sample_bad_rows(10).len(), 2);
        assert!(stats.bad_row_sample_bytes() <= size * 2);
        assert_eq!(stats.rows_dropped(), 5);
    }

    #[test]
    fn test_sample_keeps_first_oversized_entry() {
        let mut stats = WriteStats::default();
        stats.record_dropped(&[text_row("t", &"x".repeat(100))], 10);
        stats.record_dropped(&[text_row("t", "y")], 10);
        let sample = stats.sample_bad_rows(10);
        assert_eq!(sample.len(), 1);
        assert!(sample[0].starts_with("table=t cols=[v] data=[xxx"));
    }

    #[test]
    fn test_sample_bad_rows_honours_n() {
        let mut stats = WriteStats::default();
        for name in ["a", "b", "c"] {
            stats.record_dropped(&[text_row("t", name)], 1024);
        }
        assert_eq!(
            stats.sample_bad_rows(2),
            vec!["table=t cols=[v] data=[a]", "table=t cols=[v] data=[b]"]
        );
    }
}
