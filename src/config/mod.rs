//! Configuration module for the gateway service

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::providers::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Main application settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub gemini: GeminiSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Identity provider configuration
///
/// The secret key authorizes the JWKS fetch against the provider's backend
/// API. An empty key is tolerated at startup; verification then fails per
/// request with 401.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub secret_key: String,
    pub jwks_url: String,
}

/// PostgreSQL configuration for the usage log store
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
}

/// Redis configuration for the rate-limit counter store
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub url: String,
    /// When the counter store is unreachable: allow the request (`true`)
    /// or reject it with 503 (`false`).
    pub fail_open: bool,
    pub limit: i64,
    pub window_secs: u64,
}

/// Upstream generate-content API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
}

impl Settings {
    /// Load configuration from files and environment variables
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Environment variables (prefixed with GATEWAY_)
    /// 2. config/local.toml (gitignored)
    /// 3. config/default.toml
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local overrides (gitignored)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment variables (GATEWAY_SERVER__PORT, etc.)
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: None,
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            secret_key: String::new(),
            jwks_url: "https://api.clerk.com/v1/jwks".to_string(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings { url: String::new() }
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        RedisSettings {
            url: String::new(),
            fail_open: true,
            limit: 10,
            window_secs: 60,
        }
    }
}

impl Default for GeminiSettings {
    fn default() -> Self {
        GeminiSettings {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }
}
