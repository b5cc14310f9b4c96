//! Configuration module
//!
//! Handles loading and saving CalcNet configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::network::{self, TransportKind};
use crate::protocol::{DEFAULT_PORT, GREETING};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Network settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Client settings
    #[serde(default)]
    pub client: ClientConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
    /// Banner the TCP server sends to each new connection
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

fn default_greeting() -> String {
    GREETING.to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            greeting: default_greeting(),
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Transport: "tcp" or "udp"
    #[serde(default)]
    pub transport: TransportKind,
    /// Port to listen on / connect to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interface to bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Connection timeout in ms
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Per-receive timeout in ms (unset = wait forever)
    pub receive_timeout_ms: Option<u64>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_connect_timeout() -> u64 {
    5000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            port: default_port(),
            bind_address: default_bind_address(),
            connect_timeout_ms: default_connect_timeout(),
            receive_timeout_ms: None,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server host name; asked for interactively when unset
    pub server: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("calcnet/config.toml")),
            Some(PathBuf::from("./calcnet.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Runtime network settings, before command-line overrides
    pub fn network_config(&self) -> network::NetworkConfig {
        let mut net = network::NetworkConfig::new(self.network.transport, self.network.port)
            .with_bind_address(self.network.bind_address.clone())
            .with_receive_timeout(self.network.receive_timeout_ms);
        net.greeting = self.general.greeting.clone();
        net.connect_timeout_ms = self.network.connect_timeout_ms;
        net
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        network: NetworkConfig {
            transport: TransportKind::Udp,
            receive_timeout_ms: Some(30_000),
            ..Default::default()
        },
        client: ClientConfig {
            server: Some("localhost".to_string()),
        },
        ..Default::default()
    };

    Ok(toml::to_string_pretty(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.port, DEFAULT_PORT);
        assert_eq!(config.network.transport, TransportKind::Tcp);
        assert_eq!(config.general.greeting, GREETING);
    }

    #[test]
    fn test_save_and_load() {
        let config = Config::default();
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.network.port, config.network.port);
        assert_eq!(loaded.client.server, None);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[network]\ntransport = \"udp\"\nport = 6000").unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.network.transport, TransportKind::Udp);
        assert_eq!(loaded.network.port, 6000);
        assert_eq!(loaded.network.bind_address, "0.0.0.0");
        assert_eq!(loaded.general.greeting, GREETING);
    }

    #[test]
    fn test_unknown_transport_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[network]\ntransport = \"sctp\"").unwrap();

        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let path = Path::new("/definitely/not/here/calcnet.toml");
        assert!(matches!(Config::load(path), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config().unwrap();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.network.transport, TransportKind::Udp);
        assert_eq!(parsed.client.server.as_deref(), Some("localhost"));

        let net = parsed.network_config();
        assert_eq!(net.transport, TransportKind::Udp);
        assert_eq!(net.port, DEFAULT_PORT);
        assert_eq!(net.bind_address, "0.0.0.0");
        assert_eq!(net.receive_timeout_ms, Some(30_000));
        assert_eq!(net.connect_timeout_ms, 5000);
        assert_eq!(net.greeting, GREETING);
    }
}
