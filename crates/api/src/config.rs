//! Application configuration loaded from environment variables.

use std::time::Duration;

use payments::GatewayConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL connection string (default: unset, in-memory store)
/// - `MPESA_BASE_URL`, `MPESA_SHORTCODE`, `MPESA_PASSKEY`, `MPESA_CLIENT_KEY`,
///   `MPESA_CLIENT_SECRET`, `MPESA_CALLBACK_URL`, `MPESA_TIMEOUT_SECS` — payment gateway
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub gateway: GatewayConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = GatewayConfig::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: var("PORT").and_then(|p| p.parse().ok()).unwrap_or(3000),
            log_level: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            database_url: var("DATABASE_URL"),
            gateway: GatewayConfig {
                base_url: var("MPESA_BASE_URL").unwrap_or(defaults.base_url),
                shortcode: var("MPESA_SHORTCODE").unwrap_or(defaults.shortcode),
                passkey: var("MPESA_PASSKEY").unwrap_or_default(),
                client_key: var("MPESA_CLIENT_KEY").unwrap_or_default(),
                client_secret: var("MPESA_CLIENT_SECRET").unwrap_or_default(),
                callback_url: var("MPESA_CALLBACK_URL").unwrap_or(defaults.callback_url),
                timeout: var("MPESA_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.timeout),
            },
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            gateway: GatewayConfig::default(),
        }
    }
}
