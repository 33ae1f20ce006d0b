//! Server configuration

use anyhow::Result;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listener configuration
    #[serde(default)]
    pub server: ListenConfig,

    /// Frame storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ListenConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Handshake timeout in seconds; peers that never complete the
    /// key exchange are dropped after this long
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
}

impl ListenConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

fn default_bind() -> SocketAddr {
    "0.0.0.0:7700".parse().unwrap()
}

fn default_handshake_timeout() -> u64 {
    10
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            handshake_timeout_secs: default_handshake_timeout(),
        }
    }
}

/// Frame storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory for received screen frames
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
}

fn default_image_dir() -> String {
    "images".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server.bind.port(), 7700);
        assert_eq!(config.server.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.storage.image_dir, "images");
    }

    #[test]
    fn test_partial_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            [server]
            bind = "127.0.0.1:9000"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind.port(), 9000);
        assert_eq!(config.server.handshake_timeout_secs, 10);
    }
}
