//! Adaptive concurrent batch writer.
//!
//! [`BatchWriter`] takes a stream of already-converted rows and delivers them
//! to a [`BatchSink`] that enforces per-operation limits and rejects a whole
//! operation when any one row in it is bad. It provides:
//!
//! - **Threshold batching**: rows are grouped FIFO into batches that stay under
//!   the mutation and byte ceilings
//! - **Bounded concurrency**: at most `write_limit` batches are in flight, and
//!   the producer only waits when both the concurrency and buffered-byte
//!   budgets are exhausted
//! - **Failure isolation**: a failed batch is split into smaller pieces and
//!   retried until the bad rows are isolated or the retry budget runs out
//! - **Statistics**: errors, dropped rows and a sample of bad rows are
//!   aggregated for reporting after [`flush`](BatchWriter::flush)
//!
//! Writes are fire-and-forget: `add_row` and `flush` never fail. Callers must
//! consult the statistics to learn about lost rows.

mod buffer;
mod report;
mod sink;
mod stats;

pub use buffer::RowBuffer;
pub use report::WriteReport;
pub use sink::BatchSink;
pub use stats::WriteStats;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::core::{row, Row, SqlValue};

/// Batch writer configuration.
#[derive(Debug, Clone)]
pub struct BatchWriterConfig {
    /// Maximum number of concurrently executing write tasks.
    pub write_limit: usize,
    /// Buffered bytes allowed before the producer is made to wait. Also caps
    /// the size of the bad-row sample.
    pub bytes_limit: usize,
    /// Lifetime cap on split-retry attempts across all batches.
    pub retry_limit: u64,
    /// Mutation ceiling per batch, kept below the backend's hard limit.
    pub max_mutations: usize,
    /// Estimated byte ceiling per batch.
    pub max_batch_bytes: usize,
    /// Log every failed attempt, split and drop at info level.
    pub verbose: bool,
}

impl Default for BatchWriterConfig {
    fn default() -> Self {
        Self {
            write_limit: 8,
            bytes_limit: 64 * 1024 * 1024,
            retry_limit: 1_000,
            max_mutations: 20_000,
            max_batch_bytes: 4 * 1024 * 1024,
            verbose: false,
        }
    }
}

impl BatchWriterConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of concurrent write tasks.
    pub fn with_write_limit(mut self, count: usize) -> Self {
        self.write_limit = count.max(1);
        self
    }

    /// Set the buffered-byte backpressure threshold.
    pub fn with_bytes_limit(mut self, bytes: usize) -> Self {
        self.bytes_limit = bytes;
        self
    }

    /// Set the lifetime split-retry budget.
    pub fn with_retry_limit(mut self, retries: u64) -> Self {
        self.retry_limit = retries;
        self
    }

    /// Set the per-batch mutation ceiling.
    pub fn with_max_mutations(mut self, mutations: usize) -> Self {
        self.max_mutations = mutations.max(1);
        self
    }

    /// Set the per-batch byte ceiling.
    pub fn with_max_batch_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_bytes = bytes.max(1);
        self
    }

    /// Enable or disable verbose tracing of failures.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// State shared between the producer handle and its write tasks.
struct Shared {
    sink: Arc<dyn BatchSink>,
    in_flight: AtomicUsize,
    retries: AtomicU64,
    retry_limit: u64,
    sample_byte_limit: usize,
    verbose: bool,
    /// Signalled whenever a write task finishes.
    task_done: Notify,
    stats: Mutex<WriteStats>,
}

/// Releases an in-flight slot when a write task ends, including by panic.
struct InFlightSlot(Arc<Shared>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.0.task_done.notify_one();
    }
}

/// A pending write. Pieces of a failed batch carry `retry = true`.
struct Attempt {
    rows: Vec<Row>,
    retry: bool,
}

impl Shared {
    fn stats(&self) -> MutexGuard<'_, WriteStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write a batch, splitting and retrying on failure.
    ///
    /// Runs entirely inside the task that owns the batch. Pieces of a failed
    /// batch are attempted depth-first in row order; each piece consumes one
    /// unit of the shared retry budget before it is attempted.
    async fn attempt_write(&self, rows: Vec<Row>) {
        let mut stack = vec![Attempt { rows, retry: false }];

        while let Some(Attempt { rows, retry }) = stack.pop() {
            if retry {
                self.retries.fetch_add(1, Ordering::AcqRel);
            }

            let error = match self.sink.write(&rows).await {
                Ok(()) => {
                    self.stats().record_written(&rows);
                    continue;
                }
                Err(e) => e.to_string(),
            };

            let table = rows.first().map(Row::table).unwrap_or_default();
            if self.verbose {
                info!(
                    "Write of {} rows ({} mutations, first table {}) failed: {}",
                    rows.len(),
                    row::mutation_count(&rows),
                    table,
                    error
                );
            } else {
                debug!("Write of {} rows failed: {}", rows.len(), error);
            }
            self.stats().record_error(&error);

            let retries = self.retries.load(Ordering::Acquire);
            if rows.len() > 1 && retries < self.retry_limit {
                let pieces = split_batch(rows);
                if self.verbose {
                    info!(
                        "Splitting failed batch into {} pieces (retries used: {}/{})",
                        pieces.len(),
                        retries,
                        self.retry_limit
                    );
                }
                stack.extend(
                    pieces
                        .into_iter()
                        .rev()
                        .map(|rows| Attempt { rows, retry: true }),
                );
            } else {
                if self.verbose {
                    warn!(
                        "Dropping {} rows (first table {}) after failed write",
                        rows.len(),
                        table
                    );
                }
                self.stats().record_dropped(&rows, self.sample_byte_limit);
            }
        }
    }
}

/// Split a failed batch into contiguous pieces of `1 + len / 10` rows.
///
/// Every piece is strictly smaller than the input when it has two or more
/// rows, so repeated splitting always reaches single rows.
fn split_batch(rows: Vec<Row>) -> Vec<Vec<Row>> {
    let piece_len = 1 + rows.len() / 10;
    let mut pieces = Vec::with_capacity(rows.len().div_ceil(piece_len));
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
        pieces.push(rows.by_ref().take(piece_len).collect());
    }
    pieces
}

/// Producer handle of the batch-write engine.
///
/// Only one producer may drive a writer: [`add_row`](Self::add_row) and
/// [`flush`](Self::flush) take `&mut self`, and the row buffer behind them is
/// unsynchronized. Write tasks are spawned on the current tokio runtime.
pub struct BatchWriter {
    config: BatchWriterConfig,
    buffer: RowBuffer,
    shared: Arc<Shared>,
    rows_added: i64,
    started_at: DateTime<Utc>,
}

impl BatchWriter {
    /// Create a writer delivering batches to `sink`.
    pub fn new<S: BatchSink>(sink: S, config: BatchWriterConfig) -> Self {
        let config = BatchWriterConfig {
            write_limit: config.write_limit.max(1),
            ..config
        };
        let shared = Arc::new(Shared {
            sink: Arc::new(sink),
            in_flight: AtomicUsize::new(0),
            retries: AtomicU64::new(0),
            retry_limit: config.retry_limit,
            sample_byte_limit: config.bytes_limit,
            verbose: config.verbose,
            task_done: Notify::new(),
            stats: Mutex::new(WriteStats::default()),
        });

        Self {
            config,
            buffer: RowBuffer::new(),
            shared,
            rows_added: 0,
            started_at: Utc::now(),
        }
    }

    /// Get the effective configuration.
    pub fn config(&self) -> &BatchWriterConfig {
        &self.config
    }

    /// Buffer a row and start writes for any batches that are ready.
    ///
    /// Waits only when `write_limit` tasks are in flight and the buffer has
    /// grown past `bytes_limit`.
    pub async fn add_row(
        &mut self,
        table: impl Into<String>,
        columns: Vec<String>,
        values: Vec<SqlValue>,
    ) {
        self.push(Row::new(table, columns, values)).await;
    }

    /// Buffer a prebuilt row. Same semantics as [`add_row`](Self::add_row).
    pub async fn push(&mut self, row: Row) {
        self.buffer.push(row);
        self.rows_added += 1;
        self.drain(false).await;
    }

    /// Write every buffered row and wait for all in-flight writes to finish.
    ///
    /// On return every row added so far is either written or dropped.
    pub async fn flush(&mut self) {
        self.drain(true).await;
        loop {
            let done = self.shared.task_done.notified();
            if self.shared.in_flight.load(Ordering::Acquire) == 0 {
                break;
            }
            done.await;
        }
        debug!(
            "Flushed writer: {} rows added, {} written, {} dropped",
            self.rows_added,
            self.rows_written(),
            self.rows_dropped()
        );
    }

    fn batch_ready(&self, flushing: bool) -> bool {
        if flushing {
            !self.buffer.is_empty()
        } else {
            self.buffer.mutations() > self.config.max_mutations
                || self.buffer.bytes() > self.config.max_batch_bytes
        }
    }

    async fn drain(&mut self, flushing: bool) {
        while self.batch_ready(flushing) {
            if self.shared.in_flight.load(Ordering::Acquire) < self.config.write_limit {
                let batch = self
                    .buffer
                    .assemble_next_batch(self.config.max_mutations, self.config.max_batch_bytes);
                self.spawn_write(batch);
            } else if !flushing && self.buffer.bytes() <= self.config.bytes_limit {
                break;
            } else {
                self.wait_for_capacity().await;
            }
        }
    }

    fn spawn_write(&self, batch: Vec<Row>) {
        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
        let slot = InFlightSlot(Arc::clone(&self.shared));
        debug!(
            "Dispatching batch of {} rows ({} bytes, {} in flight)",
            batch.len(),
            row::byte_size(&batch),
            self.in_flight()
        );

        tokio::spawn(async move {
            slot.0.attempt_write(batch).await;
            drop(slot);
        });
    }

    async fn wait_for_capacity(&self) {
        let done = self.shared.task_done.notified();
        if self.shared.in_flight.load(Ordering::Acquire) < self.config.write_limit {
            return;
        }
        done.await;
    }

    /// When the writer was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Summarize the run. Call after [`flush`](Self::flush).
    pub fn report(&self, config_hash: impl Into<String>) -> WriteReport {
        WriteReport::from_writer(self, config_hash)
    }

    /// Number of write tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Number of rows waiting in the buffer.
    pub fn buffered_rows(&self) -> usize {
        self.buffer.len()
    }

    /// Total rows handed to the writer.
    pub fn rows_added(&self) -> i64 {
        self.rows_added
    }

    /// Total rows successfully written.
    pub fn rows_written(&self) -> i64 {
        self.shared.stats().rows_written()
    }

    /// Total rows permanently abandoned.
    pub fn rows_dropped(&self) -> i64 {
        self.shared.stats().rows_dropped()
    }

    /// Split-retry attempts consumed so far.
    pub fn retries_consumed(&self) -> u64 {
        self.shared.retries.load(Ordering::Acquire)
    }

    /// Failed write counts keyed by error message.
    pub fn errors(&self) -> HashMap<String, i64> {
        self.shared.stats().errors()
    }

    /// Dropped row counts keyed by target table.
    pub fn dropped_rows_by_table(&self) -> HashMap<String, i64> {
        self.shared.stats().dropped_rows_by_table()
    }

    /// Written row counts keyed by target table.
    pub fn written_rows_by_table(&self) -> HashMap<String, i64> {
        self.shared.stats().written_rows_by_table()
    }

    /// Up to `n` rows that failed on their own, formatted as
    /// `table=<t> cols=[..] data=[..]`.
    pub fn sample_bad_rows(&self, n: usize) -> Vec<String> {
        self.shared.stats().sample_bad_rows(n)
    }
}
