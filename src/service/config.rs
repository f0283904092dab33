use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

/// Identity of the default broker endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub path: String,
    pub port: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            host: "localhost".to_string(),
            path: String::new(),
            port: 9200,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// The broker protocol frames replies by "last chunk is short", so this
    /// size doubles as the framing unit.
    pub recv_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            connect_timeout_ms: 60_000,
            read_timeout_ms: 60_000,
            recv_buffer_size: 256,
        }
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections_per_key: usize,
    pub idle_timeout_ms: u64,
    pub reap_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_connections_per_key: 4,
            idle_timeout_ms: 180_000,
            reap_interval_ms: 30_000,
        }
    }
}

impl PoolConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
    pub broker: BrokerConfig,
    pub network: NetworkConfig,
    pub pool: PoolConfig,
}

impl ClientConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<ClientConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;

        let client_config: ClientConfig = config.try_deserialize()?;

        Ok(client_config)
    }
}
