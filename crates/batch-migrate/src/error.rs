//! Error types for the batch-migrate library.
//!
//! The write engine itself never surfaces errors to its caller; failures of
//! individual batches are aggregated into statistics instead. These types
//! cover everything around it: configuration, the PostgreSQL sink, and the
//! row input reader.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A batch write against a table was rejected
    #[error("Write failed for table {table}: {message}")]
    Write { table: String, message: String },

    /// Malformed input row
    #[error("Invalid input at line {line}: {message}")]
    Input { line: usize, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Write error
    pub fn write(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Write {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an Input error for the given 1-based line number
    pub fn input(line: usize, message: impl Into<String>) -> Self {
        MigrateError::Input {
            line,
            message: message.into(),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 1,
            MigrateError::Target(_) | MigrateError::Pool { .. } => 2,
            MigrateError::Write { .. } => 3,
            MigrateError::Input { .. } | MigrateError::Json(_) => 4,
            MigrateError::Io(_) => 7,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
