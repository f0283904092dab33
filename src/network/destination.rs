use std::fmt;

use serde::{Deserialize, Serialize};

use crate::service::BrokerConfig;

/// Identity of a remote broker endpoint. Doubles as the pool key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub host: String,
    pub path: String,
    pub port: u16,
}

impl Destination {
    pub fn new(host: impl Into<String>, path: impl Into<String>, port: u16) -> Destination {
        Destination {
            host: host.into(),
            path: path.into(),
            port,
        }
    }

    /// The `host:port` form accepted by the resolver.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}/{}", self.host, self.port, self.path)
        }
    }
}

impl From<&BrokerConfig> for Destination {
    fn from(config: &BrokerConfig) -> Destination {
        Destination::new(config.host.clone(), config.path.clone(), config.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_path_only_when_present() {
        let plain = Destination::new("vista01", "", 9200);
        assert_eq!(plain.to_string(), "vista01:9200");

        let with_path = Destination::new("vista01", "ROU", 9200);
        assert_eq!(with_path.to_string(), "vista01:9200/ROU");
        assert_eq!(with_path.address(), "vista01:9200");
    }
}
