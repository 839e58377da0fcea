//! Coordinator configuration
//!
//! Loaded from the shared TOML config file; every field has a default so a
//! missing or partial file still yields a working coordinator. Environment
//! variables override the file for the two endpoints.

use serde::Deserialize;

use crewlink_utils::paths;

/// Coordinator configuration (~/.config/crewlink/config.toml)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Push server endpoint (`tcp://` or `unix://`)
    pub push_endpoint: String,
    /// Backend REST API base URL
    pub api_base: String,
    /// URL prefixes a surface must match to register for pushes
    pub allowed_surface_urls: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            push_endpoint: "tcp://127.0.0.1:9137".into(),
            api_base: "http://127.0.0.1:9117/".into(),
            allowed_surface_urls: vec!["http://127.0.0.1".into(), "https://127.0.0.1".into()],
        }
    }
}

impl Config {
    /// Load from the default config file, then apply environment overrides.
    ///
    /// Returns defaults if the file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let mut config = Self::load_file();
        if let Ok(endpoint) = std::env::var("CREWLINK_PUSH_URL") {
            config.push_endpoint = endpoint;
        }
        if let Ok(base) = std::env::var("CREWLINK_API_URL") {
            config.api_base = base;
        }
        config
    }

    fn load_file() -> Self {
        let path = paths::config_file();
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults");
            return Self::default();
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file: {}, using defaults", e);
                Self::default()
            }
        }
    }
}
