//! Producer-side row buffer and batch assembly.

use std::collections::VecDeque;

use crate::core::Row;

/// FIFO buffer of rows waiting to be assembled into batches.
///
/// Not synchronized: it is owned by the single producer driving a
/// [`BatchWriter`](super::BatchWriter).
#[derive(Debug, Default)]
pub struct RowBuffer {
    rows: VecDeque<Row>,
    bytes: usize,
    mutations: usize,
}

impl RowBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row to the tail.
    pub fn push(&mut self, row: Row) {
        self.bytes += row.byte_size();
        self.mutations += row.mutation_count();
        self.rows.push_back(row);
    }

    /// Number of buffered rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the buffer holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Estimated bytes currently buffered.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Mutations currently buffered.
    pub fn mutations(&self) -> usize {
        self.mutations
    }

    /// Take the longest prefix of the buffer that fits both ceilings.
    ///
    /// The first row is always taken, even when it alone exceeds a ceiling,
    /// so the result is empty only when the buffer is.
    pub fn assemble_next_batch(&mut self, max_mutations: usize, max_bytes: usize) -> Vec<Row> {
        let mut batch = Vec::new();
        let mut mutations = 0;
        let mut bytes = 0;

        while let Some(row) = self.rows.pop_front() {
            let next_mutations = mutations + row.mutation_count();
            let next_bytes = bytes + row.byte_size();
            if !batch.is_empty() && (next_mutations > max_mutations || next_bytes > max_bytes) {
                self.rows.push_front(row);
                break;
            }
            mutations = next_mutations;
            bytes = next_bytes;
            batch.push(row);
        }

        self.mutations -= mutations;
        self.bytes -= bytes;
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{row, SqlValue};

    fn row_with(table: &str, ncols: usize, text: &str) -> Row {
        let columns = (0..ncols).map(|i| format!("c{}", i)).collect();
        let values = (0..ncols).map(|_| SqlValue::from(text)).collect();
        Row::new(table, columns, values)
    }

    #[test]
    fn test_assemble_empty_buffer() {
        let mut buffer = RowBuffer::new();
        assert!(buffer.assemble_next_batch(10, 10).is_empty());
    }

    #[test]
    fn test_assemble_respects_mutation_ceiling() {
        let mut buffer = RowBuffer::new();
        for _ in 0..5 {
            buffer.push(row_with("t", 3, "x"));
        }
        let batch = buffer.assemble_next_batch(7, usize::MAX);
        assert_eq!(batch.len(), 2);
        assert_eq!(row::mutation_count(&batch), 6);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.mutations(), 9);
    }

    #[test]
    fn test_assemble_respects_byte_ceiling() {
        let mut buffer = RowBuffer::new();
        for _ in 0..4 {
            buffer.push(row_with("t", 1, "0123456789"));
        }
        let per_row = buffer.bytes() / 4;
        let batch = buffer.assemble_next_batch(usize::MAX, per_row * 3 - 1);
        assert_eq!(batch.len(), 2);
        assert!(row::byte_size(&batch) < per_row * 3);
        assert_eq!(buffer.bytes(), per_row * 2);
    }

    #[test]
    fn test_oversized_row_is_sent_alone() {
        let mut buffer = RowBuffer::new();
        buffer.push(row_with("t", 50, "x"));
        buffer.push(row_with("t", 1, "x"));
        let batch = buffer.assemble_next_batch(10, 10);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].mutation_count(), 50);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_assembly_preserves_fifo_order() {
        let mut buffer = RowBuffer::new();
        for i in 0..6 {
            buffer.push(Row::new("t", vec!["id".into()], vec![SqlValue::I64(i)]));
        }
        let mut seen = Vec::new();
        while !buffer.is_empty() {
            let batch = buffer.assemble_next_batch(4, usize::MAX);
            assert!(!batch.is_empty());
            assert!(row::mutation_count(&batch) <= 4);
            seen.extend(batch.into_iter().map(|r| r.values()[0].clone()));
        }
        let expected: Vec<SqlValue> = (0..6).map(SqlValue::I64).collect();
        assert_eq!(seen, expected);
        assert_eq!(buffer.bytes(), 0);
        assert_eq!(buffer.mutations(), 0);
    }
}
