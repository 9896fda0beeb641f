//! Rows as handed to the write engine.

use std::fmt;

use super::value::SqlValue;

/// One logical row to persist into a target table.
///
/// Rows are immutable once built. Their byte estimate is computed at
/// construction so the buffer and the batch assembler never re-walk values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    table: String,
    columns: Vec<String>,
    values: Vec<SqlValue>,
    byte_size: usize,
}

impl Row {
    /// Build a row. `columns` and `values` must have the same length.
    pub fn new(table: impl Into<String>, columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(
            columns.len(),
            values.len(),
            "row columns and values must have the same length"
        );
        let byte_size = columns.iter().map(String::len).sum::<usize>()
            + values.iter().map(SqlValue::estimated_size).sum::<usize>();
        Self {
            table: table.into(),
            columns,
            values,
            byte_size,
        }
    }

    /// Target table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column names, in value order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Column values, in column order.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Number of field-level mutations this row costs the backend.
    pub fn mutation_count(&self) -> usize {
        self.columns.len()
    }

    /// Estimated payload size in bytes.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }
}

/// Diagnostic form used for bad-row samples:
/// `table=<t> cols=[a b] data=[1 x]`.
impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table={} cols=[{}] data=[", self.table, self.columns.join(" "))?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", value)?;
        }
        f.write_str("]")
    }
}

/// Total mutations across a slice of rows.
pub fn mutation_count(rows: &[Row]) -> usize {
    rows.iter().map(Row::mutation_count).sum()
}

/// Total estimated bytes across a slice of rows.
pub fn byte_size(rows: &[Row]) -> usize {
    rows.iter().map(Row::byte_size).sum()
}
