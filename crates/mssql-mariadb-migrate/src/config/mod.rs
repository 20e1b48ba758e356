//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
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
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
source:
  host: mssql.local
  database: dbmidterm
  user: sa
  password: secret
target:
  host: mariadb.local
  database: test
  user: root
  password: secret
"#;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.source.port, 1433);
        assert_eq!(config.source.schema, "dbo");
        assert!(config.source.encrypt);
        assert_eq!(config.target.port, 3306);
        assert_eq!(config.target.ssl_mode, "prefer");
        assert_eq!(config.migration.batch_size, 1000);
        assert_eq!(config.migration.commit_mode, CommitMode::Checkpointed);
        assert_eq!(config.migration.checkpoint_every_pages, 50);
        assert_eq!(config.migration.sample_size, 100);
        assert_eq!(config.migration.max_fallback_errors, 10);
    }

    #[test]
    fn test_from_yaml_migration_section() {
        let yaml = format!(
            "{}migration:\n  batch_size: 250\n  commit_mode: strict\n  table_order: [Owner, Factory]\n",
            MINIMAL
        );
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.migration.batch_size, 250);
        assert_eq!(config.migration.commit_mode, CommitMode::Strict);
        assert_eq!(config.migration.table_order, vec!["Owner", "Factory"]);
    }

    #[test]
    fn test_from_yaml_rejects_invalid() {
        let yaml = format!("{}migration:\n  batch_size: 0\n", MINIMAL);
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.source.database, "dbmidterm");
    }
}
