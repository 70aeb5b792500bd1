//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub log_level: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Agent API authentication (unset disables the whole agent surface)
    pub agent_api_token: Option<String>,

    // WebSocket sessions
    pub ws_idle_timeout_secs: u64,
    pub ws_sweep_interval_secs: u64,
    pub ws_outbound_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),

            // Agent API authentication
            agent_api_token: env::var("AGENT_API_TOKEN").ok(),

            // WebSocket sessions
            ws_idle_timeout_secs: env::var("WS_IDLE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            ws_sweep_interval_secs: env::var("WS_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            ws_outbound_buffer: env::var("WS_OUTBOUND_BUFFER")
                .unwrap_or_else(|_| "64".to_string())
                .parse()
                .unwrap_or(64),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to set the only required env var
    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
    }

    /// Helper to clear env vars after tests
    fn cleanup_config() {
        env::remove_var("DATABASE_URL");
        env::remove_var("BIND_ADDRESS");
        env::remove_var("DATABASE_MAX_CONNECTIONS");
        env::remove_var("AGENT_API_TOKEN");
        env::remove_var("WS_IDLE_TIMEOUT_SECS");
        env::remove_var("WS_SWEEP_INTERVAL_SECS");
        env::remove_var("WS_OUTBOUND_BUFFER");
    }

    #[test]
    #[serial]
    fn test_defaults() {
        cleanup_config();
        setup_minimal_config();

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.database_max_connections, 20);
        assert!(config.agent_api_token.is_none());
        assert_eq!(config.ws_idle_timeout_secs, 300);
        assert_eq!(config.ws_sweep_interval_secs, 60);
        assert_eq!(config.ws_outbound_buffer, 64);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_missing_database_url() {
        cleanup_config();

        let result = Config::from_env();
        match result {
            Err(ConfigError::Missing("DATABASE_URL")) => {}
            other => panic!("Expected Missing error for DATABASE_URL, got: {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_overrides() {
        cleanup_config();
        setup_minimal_config();
        env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
        env::set_var("AGENT_API_TOKEN", "secret-token");
        env::set_var("WS_IDLE_TIMEOUT_SECS", "30");

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(config.agent_api_token.as_deref(), Some("secret-token"));
        assert_eq!(config.ws_idle_timeout_secs, 30);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_unparsable_numbers_fall_back_to_defaults() {
        cleanup_config();
        setup_minimal_config();
        env::set_var("DATABASE_MAX_CONNECTIONS", "not-a-number");
        env::set_var("WS_OUTBOUND_BUFFER", "-5");

        let config = Config::from_env().unwrap();
        assert_eq!(config.database_max_connections, 20);
        assert_eq!(config.ws_outbound_buffer, 64);

        cleanup_config();
    }
}
