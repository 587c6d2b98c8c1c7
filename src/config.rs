//! Peer Map Configuration
//!
//! Configurable parameters for the peer map service.
//! Defaults target the public geolocation and geocoding services, which
//! rate-limit aggressively, so the poll interval stays conservative.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for the peer map service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerMapConfig {
    // === Peer source ===

    /// Network name passed to the peer list endpoint
    pub network: String,

    /// Base URL of the peer list endpoint (`<base>/peer?network=<name>`)
    pub peer_endpoint: String,

    // === External lookups ===

    /// Base URL of the IP geolocation service (`<base>/<ip>/json`)
    pub geolocation_url: String,

    /// Base URL of the forward geocoding service (`<base>/search`)
    pub geocoding_url: String,

    /// User agent sent with every outgoing request
    /// Public geocoders refuse anonymous clients
    pub user_agent: String,

    // === Timing ===

    /// Interval between poll cycles (seconds)
    pub poll_interval_secs: u64,

    /// Timeout for a single outgoing request (seconds)
    /// Must stay below the poll interval
    pub request_timeout_secs: u64,

    // === API ===

    /// Port for the HTTP API
    pub api_port: u16,
}

impl Default for PeerMapConfig {
    fn default() -> Self {
        Self {
            network: "mirana".to_string(),
            peer_endpoint: "http://127.0.0.1:8080".to_string(),

            geolocation_url: "https://ipinfo.io".to_string(),
            geocoding_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: format!("kratos-peer-map/{}", env!("CARGO_PKG_VERSION")),

            poll_interval_secs: 20,
            request_timeout_secs: 10,

            api_port: 8090,
        }
    }
}

impl PeerMapConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // Builder-style methods for CLI overrides

    pub fn with_network(mut self, network: Option<String>) -> Self {
        if let Some(network) = network {
            self.network = network;
        }
        self
    }

    pub fn with_peer_endpoint(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = endpoint {
            self.peer_endpoint = endpoint;
        }
        self
    }

    pub fn with_api_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.api_port = port;
        }
        self
    }

    pub fn with_poll_interval(mut self, secs: Option<u64>) -> Self {
        if let Some(secs) = secs {
            self.poll_interval_secs = secs;
        }
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.network.trim().is_empty() {
            anyhow::bail!("network must not be empty");
        }

        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than zero");
        }

        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }

        if self.request_timeout_secs >= self.poll_interval_secs {
            anyhow::bail!(
                "request_timeout_secs ({}) must be less than poll_interval_secs ({})",
                self.request_timeout_secs,
                self.poll_interval_secs
            );
        }

        for (name, url) in [
            ("peer_endpoint", &self.peer_endpoint),
            ("geolocation_url", &self.geolocation_url),
            ("geocoding_url", &self.geocoding_url),
        ] {
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| anyhow::anyhow!("{} ({}) is not a valid URL: {}", name, url, e))?;

            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("{} ({}) must use http or https", name, url);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = PeerMapConfig::default();
        assert_eq!(config.network, "mirana");
        assert_eq!(config.poll_interval_secs, 20);
        assert!(config.user_agent.starts_with("kratos-peer-map/"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = PeerMapConfig::default();
        assert!(config.validate().is_ok());

        // Invalid: timeout >= poll interval
        config.request_timeout_secs = 20;
        assert!(config.validate().is_err());

        let mut config = PeerMapConfig::default();
        config.network = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = PeerMapConfig::default();
        config.geocoding_url = "ftp://example.org".to_string();
        assert!(config.validate().is_err());

        let mut config = PeerMapConfig::default();
        config.peer_endpoint = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_methods() {
        let config = PeerMapConfig::default()
            .with_network(Some("pudge".to_string()))
            .with_api_port(Some(9090))
            .with_poll_interval(None);

        assert_eq!(config.network, "pudge");
        assert_eq!(config.api_port, 9090);
        assert_eq!(config.poll_interval_secs, 20);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("peer-map.toml");

        let config = PeerMapConfig::default().with_network(Some("pudge".to_string()));
        config.save(&path).unwrap();

        let loaded = PeerMapConfig::load(&path).unwrap();
        assert_eq!(loaded.network, "pudge");
        assert_eq!(loaded.geocoding_url, config.geocoding_url);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: PeerMapConfig = toml::from_str("network = \"pudge\"\n").unwrap();
        assert_eq!(config.network, "pudge");
        assert_eq!(config.api_port, 8090);
    }
}
