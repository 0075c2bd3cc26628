use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - At least one contact attempt is allowed before escalation
/// - Dispatch channel capacities are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.queue.max_retries == 0 {
        return Err(ConfigError::ValidationError(
            "queue.max_retries must be at least 1".to_string(),
        ));
    }

    if config.dispatch.buffer_size == 0 {
        return Err(ConfigError::ValidationError(
            "dispatch.buffer_size must be at least 1".to_string(),
        ));
    }

    if config.dispatch.broadcast_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "dispatch.broadcast_capacity must be at least 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DispatchConfig, QueueConfig, ServerConfig};
    use std::net::IpAddr;

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".parse::<IpAddr>().unwrap(),
                port: 0,
            },
            ..Config::default()
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_retries_fails() {
        let config = Config {
            queue: QueueConfig {
                max_retries: 0,
                retry_precedence: true,
            },
            ..Config::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_dispatch_buffer_fails() {
        let config = Config {
            dispatch: DispatchConfig {
                buffer_size: 0,
                broadcast_capacity: 256,
            },
            ..Config::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
