//! # batch-migrate
//!
//! Adaptive concurrent batch writer for relational data migrations.
//!
//! This library delivers a stream of already-converted rows to a storage
//! backend that limits the size of each write operation and rejects a whole
//! operation when any single row in it is bad. It provides:
//!
//! - **Threshold batching** under per-operation mutation and byte ceilings
//! - **Bounded concurrency** with producer backpressure
//! - **Split-and-retry** isolation of bad rows within a global retry budget
//! - **Statistics** on errors, dropped rows and sampled bad rows
//! - **PostgreSQL sink** using parameterised multi-row INSERTs
//!
//! ## Example
//!
//! ```rust,no_run
//! use batch_migrate::{BatchWriter, Config, PgSink, SqlValue};
//!
//! #[tokio::main]
//! async fn main() -> batch_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?.with_auto_tuning();
//!     let sink = PgSink::new(&config.target, config.writer.get_max_connections()).await?;
//!     let mut writer = BatchWriter::new(sink, config.writer.batch_writer_config());
//!
//!     writer
//!         .add_row("users", vec!["id".into(), "name".into()], vec![SqlValue::I64(1), "ann".into()])
//!         .await;
//!     writer.flush().await;
//!
//!     println!("Dropped rows: {:?}", writer.dropped_rows_by_table());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod source;
pub mod target;
pub mod writer;

// Re-exports for convenient access
pub use config::{Config, TargetConfig, WriterConfig};
pub use core::{Row, SqlNullType, SqlValue};
pub use error::{MigrateError, Result};
pub use source::NdjsonReader;
pub use target::{DiscardSink, HealthCheck, PgSink};
pub use writer::{BatchSink, BatchWriter, BatchWriterConfig, WriteReport};
