use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::{node::lavalink::LavalinkSettings, player::EngineSettings};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: u8, // 0-100
    pub max_queue_size: usize,
    pub self_deaf: bool,
    pub auto_leave_secs: u64, // 0 desactiva la salida automática

    // Lavalink
    pub lavalink_host: String,
    pub lavalink_port: u16,
    pub lavalink_password: String,
    pub lavalink_secure: bool,
    pub node_timeout_secs: u64,
    pub search_prefix: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            self_deaf: std::env::var("SELF_DEAF")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
            auto_leave_secs: std::env::var("AUTO_LEAVE_SECS")
                .unwrap_or_else(|_| "300".to_string()) // 5 minutos
                .parse()?,

            // Lavalink
            lavalink_host: std::env::var("LAVALINK_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),
            lavalink_port: std::env::var("LAVALINK_PORT")
                .unwrap_or_else(|_| "2333".to_string())
                .parse()?,
            lavalink_password: std::env::var("LAVALINK_PASSWORD")
                .unwrap_or_else(|_| "youshallnotpass".to_string()),
            lavalink_secure: std::env::var("LAVALINK_SECURE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,
            node_timeout_secs: std::env::var("NODE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            search_prefix: std::env::var("SEARCH_PREFIX")
                .unwrap_or_else(|_| "ytsearch:".to_string()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0 and 100
    /// - Queue size and node timeout must be greater than 0
    /// - Lavalink host and search prefix must not be empty
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 100 {
            anyhow::bail!("Default volume must be between 0 and 100, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.node_timeout_secs == 0 {
            anyhow::bail!("Node timeout must be greater than 0");
        }

        if self.lavalink_host.trim().is_empty() {
            anyhow::bail!("Lavalink host must not be empty");
        }

        if self.search_prefix.trim().is_empty() {
            anyhow::bail!("Search prefix must not be empty");
        }

        Ok(())
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs(self.node_timeout_secs)
    }

    pub fn auto_leave(&self) -> Option<Duration> {
        (self.auto_leave_secs > 0).then(|| Duration::from_secs(self.auto_leave_secs))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            node_timeout: self.node_timeout(),
            max_queue_size: self.max_queue_size,
        }
    }

    pub fn lavalink_settings(&self) -> LavalinkSettings {
        LavalinkSettings {
            host: self.lavalink_host.clone(),
            port: self.lavalink_port,
            password: self.lavalink_password.clone(),
            secure: self.lavalink_secure,
            search_prefix: self.search_prefix.clone(),
            request_timeout: self.node_timeout(),
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token and the Lavalink password.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} queue, self-deaf={}\n  \
            Lavalink: {}:{} (tls={}, timeout {}s, prefix {})\n  \
            Auto-leave: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            self.max_queue_size,
            self.self_deaf,
            self.lavalink_host,
            self.lavalink_port,
            self.lavalink_secure,
            self.node_timeout_secs,
            self.search_prefix,
            self.auto_leave()
                .map_or("disabled".to_string(), |d| format!("{}s", d.as_secs())),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Audio defaults
            default_volume: 50,
            max_queue_size: 1000,
            self_deaf: true,
            auto_leave_secs: 300,

            // Lavalink defaults
            lavalink_host: "localhost".to_string(),
            lavalink_port: 2333,
            lavalink_password: "youshallnotpass".to_string(),
            lavalink_secure: false,
            node_timeout_secs: 10,
            search_prefix: "ytsearch:".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            default_volume: 150,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            max_queue_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            node_timeout_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = Config {
            discord_token: "super-secret-token".to_string(),
            lavalink_password: "hunter2".to_string(),
            ..Config::default()
        };

        let summary = config.summary();
        assert!(!summary.contains("super-secret-token"));
        assert!(!summary.contains("hunter2"));
        assert!(summary.contains("localhost:2333"));
    }

    #[test]
    fn test_derived_settings() {
        let config = Config {
            auto_leave_secs: 0,
            ..Config::default()
        };

        assert_eq!(config.auto_leave(), None);
        assert_eq!(config.engine_settings().node_timeout, Duration::from_secs(10));
        assert_eq!(config.lavalink_settings().rest_url(), "http://localhost:2333");
    }
}
