//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration, recorded in run reports.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl TargetConfig {
    /// Build a connection string for tokio-postgres.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={} sslmode={}",
            self.host, self.port, self.database, self.user, self.password, self.ssl_mode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
target:
  host: localhost
  database: warehouse
  user: loader
  password: secret
writer:
  write_limit: 4
  retry_limit: 50
  verbose: true
"#;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.target.port, 5432);
        assert_eq!(config.target.schema, "public");
        assert_eq!(config.writer.write_limit, Some(4));
        assert_eq!(config.writer.bytes_limit, None);
        assert!(config.writer.verbose);
    }

    #[test]
    fn test_from_yaml_rejects_invalid() {
        let yaml = YAML.replace("write_limit: 4", "write_limit: 0");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, YAML).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.target.database, "warehouse");
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let a = Config::from_yaml(YAML).unwrap();
        let b = Config::from_yaml(YAML).unwrap();
        assert_eq!(a.hash(), b.hash());

        let c = Config::from_yaml(&YAML.replace("retry_limit: 50", "retry_limit: 51")).unwrap();
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_connection_string() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(
            config.target.connection_string(),
            "host=localhost port=5432 dbname=warehouse user=loader password=secret sslmode=disable"
        );
    }
}
