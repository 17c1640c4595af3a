//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{DumpError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    match &config.source.url {
        Some(url) => {
            config.source.pg_config().map_err(|_| {
                DumpError::Config(format!("source.url could not be parsed: {}", redact_url(url)))
            })?;
        }
        None => {
            if config.source.host.is_empty() {
                return Err(DumpError::Config("source.host is required".into()));
            }
            if config.source.database.is_empty() {
                return Err(DumpError::Config("source.database is required".into()));
            }
            if config.source.user.is_empty() {
                return Err(DumpError::Config("source.user is required".into()));
            }
        }
    }

    // Dump validation
    if config.dump.schema.is_empty() {
        return Err(DumpError::Config("dump.schema cannot be empty".into()));
    }
    validate_identifier(&config.dump.schema)?;

    for (field, value) in [
        ("dump.name_prefix", &config.dump.name_prefix),
        ("dump.name_suffix", &config.dump.name_suffix),
    ] {
        if value.contains('\0') {
            return Err(DumpError::Config(format!("{} contains a null byte", field)));
        }
    }

    for entry in &config.dump.ignore_tables {
        match entry.split_once('.') {
            Some((schema, name)) => {
                validate_identifier(schema)?;
                validate_identifier(name)?;
            }
            None => validate_identifier(entry)?,
        }
    }

    Ok(())
}

/// Strip the userinfo part of a connection URL.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}[REDACTED]{}", &url[..scheme + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DumpConfig, SourceConfig, SslMode};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                url: None,
                host: "localhost".to_string(),
                port: 5432,
                database: "app".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                ssl_mode: SslMode::Disable,
            },
            dump: DumpConfig::default(),
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
    fn test_url_replaces_discrete_fields() {
        let mut config = valid_config();
        config.source.host.clear();
        config.source.user.clear();
        config.source.url = Some("postgres://u:p@db/app".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_bad_url_is_redacted() {
        let mut config = valid_config();
        config.source.url = Some("postgres://u:hunter2@db:notaport/app".to_string());
        let err = validate(&config).unwrap_err().to_string();
        assert!(!err.contains("hunter2"));
        assert!(err.contains("[REDACTED]"));
    }

    #[test]
    fn test_empty_schema() {
        let mut config = valid_config();
        config.dump.schema = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_null_byte_in_prefix() {
        let mut config = valid_config();
        config.dump.name_prefix = "evt\0".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_ignore_entry() {
        let mut config = valid_config();
        config.dump.ignore_tables = vec!["".to_string()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_qualified_ignore_entry_checks_each_part() {
        let mut config = valid_config();
        let long_part = "x".repeat(60);
        config.dump.ignore_tables = vec![format!("{}.{}", long_part, long_part)];
        assert!(validate(&config).is_ok());

        config.dump.ignore_tables = vec![format!("audit.{}", "y".repeat(64))];
        assert!(validate(&config).is_err());

        config.dump.ignore_tables = vec!["audit.".to_string()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        config.source.url = Some("postgres://u:super_secret_password_123@db/app".to_string());
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
