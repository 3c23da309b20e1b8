// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Configuration for the store's one external dependency: the KVS endpoint.
//!
//! Everything else a broker node needs (listener addresses, TLS, auth,
//! clustering topology beyond the node id) is owned by the launcher and the
//! front-end, not by this crate.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

fn default_query_timeout_secs() -> u64 {
    5
}

use crate::error::Error;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub kvs: KvsConfig,

    #[serde(default)]
    pub log: Log,
}

impl Config {
    /// Loads configuration from a TOML file. The KVS password may be
    /// overridden by the `HEBO_KVS_PASSWORD` environment variable so that
    /// secrets never need to live in a committed file.
    pub fn load(path: &std::path::Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        if let Ok(password) = std::env::var("HEBO_KVS_PASSWORD") {
            config.kvs.password = Some(password);
        }
        Ok(config)
    }
}

/// Configuration for the connection to the shared key-value store.
#[derive(Debug, Deserialize, Clone)]
pub struct KvsConfig {
    /// KVS server address.
    ///
    /// Default is "127.0.0.1:6379"
    #[serde(default = "KvsConfig::default_server")]
    pub server: SocketAddr,

    /// KVS password.
    ///
    /// Default is None.
    #[serde(default = "KvsConfig::default_password")]
    pub password: Option<String>,

    /// KVS logical database number.
    ///
    /// Default is 0.
    #[serde(default = "KvsConfig::default_database")]
    pub database: i64,

    /// Per-command round trip timeout, in seconds.
    ///
    /// Default is 5.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// The logical node id this process uses when recording presence
    /// (`connected_clients(node)` / `connected_node(clientId)`).
    pub node_id: String,
}

impl KvsConfig {
    fn default_server() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 6379)
    }

    fn default_password() -> Option<String> {
        None
    }

    fn default_database() -> i64 {
        0
    }

    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
    pub log_file: Option<PathBuf>,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: LogLevel::Info,
            log_file: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let toml = r#"
            [kvs]
            node_id = "node-a"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.kvs.database, 0);
        assert_eq!(config.kvs.query_timeout(), Duration::from_secs(5));
        assert_eq!(config.kvs.node_id, "node-a");
        assert_eq!(config.log.level, LogLevel::Info);
    }
}
