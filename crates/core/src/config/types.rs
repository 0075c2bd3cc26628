use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("triage.db")
}

/// Queue policy configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Failed contact attempts before a ticket is escalated and closed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Whether retry-lane tickets outrank same-priority fresh intakes in
    /// cross-lane dispatch order.
    #[serde(default = "default_retry_precedence")]
    pub retry_precedence: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_precedence: default_retry_precedence(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_precedence() -> bool {
    true
}

/// Dispatch fan-out configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Capacity of the commit-order channel between engine and worker.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Capacity of the per-topic broadcast channels feeding WebSocket
    /// sessions. Slow clients past this lag skip messages.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

fn default_buffer_size() -> usize {
    1024
}

fn default_broadcast_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "triage.db");
        assert_eq!(config.queue.max_retries, 3);
        assert!(config.queue.retry_precedence);
        assert_eq!(config.dispatch.buffer_size, 1024);
        assert_eq!(config.dispatch.broadcast_capacity, 256);
    }

    #[test]
    fn test_deserialize_server_section() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_deserialize_queue_section() {
        let toml = r#"
[queue]
max_retries = 5
retry_precedence = false
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.queue.max_retries, 5);
        assert!(!config.queue.retry_precedence);
    }

    #[test]
    fn test_deserialize_partial_queue_section() {
        let toml = r#"
[queue]
max_retries = 2
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.queue.max_retries, 2);
        assert!(config.queue.retry_precedence); // default preserved
    }

    #[test]
    fn test_deserialize_custom_database_path() {
        let toml = r#"
[database]
path = "/data/triage.sqlite"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.path.to_str().unwrap(), "/data/triage.sqlite");
    }
}
