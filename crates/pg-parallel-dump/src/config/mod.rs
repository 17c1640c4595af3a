//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{DumpError, Result};
use std::path::Path;
use tokio_postgres::Config as PgConfig;

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

impl SourceConfig {
    /// Build the driver configuration.
    pub fn pg_config(&self) -> Result<PgConfig> {
        if let Some(url) = &self.url {
            return url
                .parse::<PgConfig>()
                .map_err(|e| DumpError::Config(format!("source.url is not valid: {}", e)));
        }

        let mut pg_config = PgConfig::new();
        pg_config.host(&self.host);
        pg_config.port(self.port);
        pg_config.dbname(&self.database);
        pg_config.user(&self.user);
        pg_config.password(&self.password);
        pg_config.application_name("pg-parallel-dump");
        Ok(pg_config)
    }

    /// Host/port/database for log lines, without credentials.
    pub fn describe(&self) -> String {
        match &self.url {
            Some(_) => "(url)".to_string(),
            None => format!("{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
source:
  host: localhost
  port: 5433
  database: app
  user: postgres
  password: secret
  ssl_mode: require
dump:
  parallelism: 8
  schema: sales
  name_prefix: evt_
  ignore_tables: [evt_tmp, sales.evt_scratch]
  data_format: insert
  on_table_error: abort
"#;

    #[test]
    fn test_from_yaml_full() {
        let config = Config::from_yaml(FULL).unwrap();
        assert_eq!(config.source.port, 5433);
        assert_eq!(config.source.ssl_mode, SslMode::Require);
        assert_eq!(config.dump.effective_parallelism(), 8);
        assert_eq!(config.dump.data_format, DataFormat::Insert);
        assert_eq!(config.dump.on_table_error, OnTableError::Abort);
        assert_eq!(config.dump.ignore_tables.len(), 2);

        let filter = config.dump.filter();
        assert_eq!(filter.schema, "sales");
        assert_eq!(filter.name_prefix, "evt_");
    }

    #[test]
    fn test_from_yaml_defaults() {
        let config = Config::from_yaml(
            "source:\n  host: db\n  database: app\n  user: postgres\n",
        )
        .unwrap();
        assert_eq!(config.source.port, 5432);
        assert_eq!(config.source.ssl_mode, SslMode::Disable);
        assert_eq!(config.dump.schema, "public");
        assert_eq!(config.dump.effective_parallelism(), 50);
        assert_eq!(config.dump.data_format, DataFormat::Copy);
        assert_eq!(config.dump.on_table_error, OnTableError::Continue);
    }

    #[test]
    fn test_from_yaml_url_only() {
        let config =
            Config::from_yaml("source:\n  url: postgres://u:p@db:6543/app\n").unwrap();
        let pg = config.source.pg_config().unwrap();
        assert_eq!(pg.get_ports(), &[6543]);
        assert_eq!(pg.get_dbname(), Some("app"));
        assert_eq!(config.source.describe(), "(url)");
    }

    #[test]
    fn test_from_yaml_rejects_unknown_ssl_mode() {
        let err = Config::from_yaml(
            "source:\n  host: db\n  database: app\n  user: u\n  ssl_mode: sometimes\n",
        )
        .unwrap_err();
        assert!(matches!(err, DumpError::Yaml(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(SslMode::parse("verify-full").unwrap(), SslMode::VerifyFull);
        assert!(SslMode::parse("bogus").is_err());
        assert_eq!(DataFormat::parse("COPY").unwrap(), DataFormat::Copy);
        assert!(DataFormat::parse("csv").is_err());
        assert_eq!(OnTableError::parse("abort").unwrap(), OnTableError::Abort);
        assert!(OnTableError::parse("retry").is_err());
    }
}
