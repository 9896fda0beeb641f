//! Sink that accepts everything, for dry runs.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::core::Row;
use crate::error::Result;
use crate::writer::BatchSink;

/// Accepts every batch without writing it anywhere.
#[derive(Debug, Default)]
pub struct DiscardSink {
    rows: AtomicU64,
    batches: AtomicU64,
}

impl DiscardSink {
    /// Create a sink that accepts every batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows accepted so far.
    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    /// Batches accepted so far.
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BatchSink for DiscardSink {
    async fn write(&self, rows: &[Row]) -> Result<()> {
        self.rows.fetch_add(rows.len() as u64, Ordering::Relaxed);
        self.batches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
