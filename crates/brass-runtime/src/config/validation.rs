//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BrassConfig, LogOutput, LoggingConfig, StoreBackend, StoreConfig, TransportConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BrassConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_store_config(&config.store)?;
    validate_transport_config(&config.transport)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    for target in logging.filters.keys() {
        if target.is_empty() || target.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid log filter target: {target:?}"
            )));
        }
    }

    Ok(())
}

fn validate_store_config(store: &StoreConfig) -> ConfigResult<()> {
    if store.key_prefix.is_empty() {
        return Err(ConfigError::validation("Store key prefix cannot be empty"));
    }

    if store.backend == StoreBackend::Redis {
        let Some(url) = &store.redis_url else {
            return Err(ConfigError::missing_field("store.redis_url"));
        };
        validate_url(url, &["redis", "rediss"])?;
    }

    Ok(())
}

fn validate_transport_config(transport: &TransportConfig) -> ConfigResult<()> {
    if transport.attempts == 0 {
        return Err(ConfigError::validation(
            "Transport attempts must be at least 1",
        ));
    }

    if transport.timeout_secs == 0 {
        return Err(ConfigError::validation(
            "Transport timeout must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_url(url: &str, schemes: &[&str]) -> ConfigResult<()> {
    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(ConfigError::invalid_url(url, "missing scheme"));
    };

    if !schemes.contains(&scheme) {
        return Err(ConfigError::invalid_url(
            url,
            format!("expected scheme to be one of {schemes:?}"),
        ));
    }

    if rest.is_empty() {
        return Err(ConfigError::invalid_url(url, "missing host"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&BrassConfig::default()).is_ok());
    }

    #[test]
    fn test_redis_requires_url() {
        let mut config = BrassConfig::default();
        config.store.backend = StoreBackend::Redis;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { ref field }) if field == "store.redis_url"
        ));

        config.store.redis_url = Some("http://localhost".into());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));

        config.store.redis_url = Some("redis://127.0.0.1:6379".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = BrassConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some(PathBuf::from("logs/brass.log"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_transport_bounds() {
        let mut config = BrassConfig::default();
        config.transport.attempts = 0;
        assert!(validate_config(&config).is_err());

        config.transport.attempts = 1;
        config.transport.timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }
}
