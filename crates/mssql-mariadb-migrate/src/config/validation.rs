//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.schema.is_empty() {
        return Err(MigrateError::Config("source.schema is required".into()));
    }
    if config.source.auth_attempts().is_empty() {
        return Err(MigrateError::Config(
            "source.user is required unless source.integrated_auth is enabled".into(),
        ));
    }
    if config.source.integrated_auth && !cfg!(feature = "integrated-auth") {
        return Err(MigrateError::Config(
            "source.integrated_auth requires the 'integrated-auth' feature".into(),
        ));
    }

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

    // Cannot migrate to the same database
    if config.source.host == config.target.host
        && config.source.port == config.target.port
        && config.source.database == config.target.database
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    let migration = &config.migration;
    if migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if migration.checkpoint_every_pages == 0 {
        return Err(MigrateError::Config(
            "migration.checkpoint_every_pages must be at least 1".into(),
        ));
    }
    if migration.sample_size == 0 {
        return Err(MigrateError::Config(
            "migration.sample_size must be at least 1".into(),
        ));
    }
    if migration.max_fallback_errors == 0 {
        return Err(MigrateError::Config(
            "migration.max_fallback_errors must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                host: "localhost".to_string(),
                port: 1433,
                database: "source_db".to_string(),
                user: "sa".to_string(),
                password: "password".to_string(),
                schema: "dbo".to_string(),
                integrated_auth: false,
                encrypt: false,
                trust_server_cert: true,
                connect_timeout_secs: 15,
            },
            target: TargetConfig {
                host: "localhost".to_string(),
                port: 3306,
                database: "target_db".to_string(),
                user: "root".to_string(),
                password: "password".to_string(),
                ssl_mode: "disable".to_string(),
                connect_timeout_secs: 15,
            },
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_source_credentials() {
        let mut config = valid_config();
        config.source.user = "".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("source.user"));
    }

    #[test]
    fn test_missing_target_database() {
        let mut config = valid_config();
        config.target.database = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_same_database_rejected() {
        let mut config = valid_config();
        config.target.port = 1433;
        config.target.database = "source_db".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.migration.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_checkpoint_interval() {
        let mut config = valid_config();
        config.migration.checkpoint_every_pages = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_fallback_cap() {
        let mut config = valid_config();
        config.migration.max_fallback_errors = 0;
        assert!(validate(&config).is_err());
    }
}
