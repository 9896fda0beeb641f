//! Configuration type definitions with auto-tuning based on system resources.

use std::fmt;

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::info;

use crate::writer::BatchWriterConfig;

/// PostgreSQL refuses statements with more bind parameters than this.
pub const PG_MAX_BIND_PARAMS: usize = 65_535;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in bytes.
    pub total_memory_bytes: u64,
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_bytes = sys.total_memory();
        let total_memory_gb = total_memory_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len().max(1);

        Self {
            total_memory_bytes,
            total_memory_gb,
            cpu_cores,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Batch writer behavior.
    #[serde(default)]
    pub writer: WriterConfig,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.writer = self.writer.with_auto_tuning(&resources);
        self
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type (only "postgres" is supported).
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_disable")]
    pub ssl_mode: String,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Batch writer configuration.
/// Performance-related fields use Option<T> to distinguish between
/// "not set" (use auto-tuned default) and "explicitly set" (use provided value).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WriterConfig {
    /// Concurrent write tasks. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_limit: Option<usize>,

    /// Buffered bytes before the producer waits. Auto-tuned based on RAM if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_limit: Option<usize>,

    /// Lifetime split-retry budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_limit: Option<u64>,

    /// Mutations (bind parameters) per batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_mutations: Option<usize>,

    /// Estimated bytes per batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batch_bytes: Option<usize>,

    /// Maximum PostgreSQL connections. Auto-tuned based on write_limit if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,

    /// Trace every failed write, split and drop.
    #[serde(default)]
    pub verbose: bool,
}

impl WriterConfig {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that are None (not explicitly set).
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        let ram_gb = resources.total_memory_gb;
        let cores = resources.cpu_cores;

        // Writes are IO-bound: two per core, 4-32 range
        if self.write_limit.is_none() {
            self.write_limit = Some((cores * 2).clamp(4, 32));
        }
        let write_limit = self.get_write_limit();

        // Buffered bytes: 1% of RAM, 16 MiB-512 MiB range
        if self.bytes_limit.is_none() {
            let mb = ((ram_gb * 1024.0) / 100.0) as usize;
            self.bytes_limit = Some(mb.clamp(16, 512) * 1024 * 1024);
        }

        // One connection per write task plus headroom
        if self.max_connections.is_none() {
            self.max_connections = Some((write_limit + 2).min(64));
        }

        info!(
            "Auto-tuned writer: write_limit={}, bytes_limit={}, max_connections={}, \
             max_mutations={}, max_batch_bytes={}, retry_limit={}",
            write_limit,
            self.get_bytes_limit(),
            self.get_max_connections(),
            self.get_max_mutations(),
            self.get_max_batch_bytes(),
            self.get_retry_limit(),
        );

        self
    }

    // Accessors returning the effective value (with fallback defaults)

    pub fn get_write_limit(&self) -> usize {
        self.write_limit.unwrap_or(8)
    }

    pub fn get_bytes_limit(&self) -> usize {
        self.bytes_limit.unwrap_or(64 * 1024 * 1024)
    }

    pub fn get_retry_limit(&self) -> u64 {
        self.retry_limit.unwrap_or(1_000)
    }

    pub fn get_max_mutations(&self) -> usize {
        self.max_mutations.unwrap_or(20_000)
    }

    pub fn get_max_batch_bytes(&self) -> usize {
        self.max_batch_bytes.unwrap_or(4 * 1024 * 1024)
    }

    pub fn get_max_connections(&self) -> usize {
        self.max_connections.unwrap_or(10)
    }

    /// Effective engine settings.
    pub fn batch_writer_config(&self) -> BatchWriterConfig {
        BatchWriterConfig::new()
            .with_write_limit(self.get_write_limit())
            .with_bytes_limit(self.get_bytes_limit())
            .with_retry_limit(self.get_retry_limit())
            .with_max_mutations(self.get_max_mutations())
            .with_max_batch_bytes(self.get_max_batch_bytes())
            .with_verbose(self.verbose)
    }
}

// Default value functions for serde
fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_disable() -> String {
    "disable".to_string()
}
