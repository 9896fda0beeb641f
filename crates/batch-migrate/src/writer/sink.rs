//! The backend boundary of the write engine.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Row;
use crate::error::Result;

/// Destination for assembled batches.
///
/// A call to [`write`](BatchSink::write) is all-or-nothing: either every row
/// in the slice is persisted or the call fails. The engine does not look at
/// why a write failed; the error's `Display` form is only used as a key for
/// aggregated error counts. Timeouts and transport retries belong to the
/// implementation.
#[async_trait]
pub trait BatchSink: Send + Sync + 'static {
    /// Persist every row of `rows` as a single operation.
    async fn write(&self, rows: &[Row]) -> Result<()>;
}

#[async_trait]
impl<S: BatchSink + ?Sized> BatchSink for Arc<S> {
    async fn write(&self, rows: &[Row]) -> Result<()> {
        (**self).write(rows).await
    }
}
