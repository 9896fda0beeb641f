//! Configuration validation.

use super::{Config, PG_MAX_BIND_PARAMS};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if config.target.r#type != "postgres" {
        return Err(MigrateError::Config(format!(
            "target.type must be 'postgres', got '{}'",
            config.target.r#type
        )));
    }

    // Connections are made without TLS
    if !matches!(config.target.ssl_mode.as_str(), "disable" | "prefer") {
        return Err(MigrateError::Config(format!(
            "target.ssl_mode must be 'disable' or 'prefer', got '{}'",
            config.target.ssl_mode
        )));
    }

    // Writer validation - only check what is explicitly set
    let writer = &config.writer;
    if let Some(0) = writer.write_limit {
        return Err(MigrateError::Config(
            "writer.write_limit must be at least 1".into(),
        ));
    }
    if let Some(0) = writer.max_mutations {
        return Err(MigrateError::Config(
            "writer.max_mutations must be at least 1".into(),
        ));
    }
    if let Some(n) = writer.max_mutations {
        if n > PG_MAX_BIND_PARAMS {
            return Err(MigrateError::Config(format!(
                "writer.max_mutations must not exceed {} (PostgreSQL bind parameter limit), got {}",
                PG_MAX_BIND_PARAMS, n
            )));
        }
    }
    if let Some(0) = writer.max_batch_bytes {
        return Err(MigrateError::Config(
            "writer.max_batch_bytes must be at least 1".into(),
        ));
    }
    if let Some(0) = writer.max_connections {
        return Err(MigrateError::Config(
            "writer.max_connections must be at least 1".into(),
        ));
    }

    Ok(())
}
