//! Agent configuration

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Server address, host:port
    #[serde(default = "default_server")]
    pub server: String,

    /// Account name
    pub username: String,

    /// Account password
    pub password: String,

    /// Opaque identifier reported at login (MAC address or similar)
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Initial capture period in seconds; the server may change it
    #[serde(default = "default_period")]
    pub period_secs: u64,
}

impl ClientConfig {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: ClientConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

fn default_server() -> String {
    "127.0.0.1:7700".to_string()
}

fn default_client_id() -> String {
    "00:00:00:00:00:00".to_string()
}

fn default_period() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml() {
        let config: ClientConfig = toml::from_str(
            r#"
            username = "alice"
            password = "longenoughpw"
            "#,
        )
        .unwrap();
        assert_eq!(config.server, "127.0.0.1:7700");
        assert_eq!(config.period(), Duration::from_secs(30));
    }
}
