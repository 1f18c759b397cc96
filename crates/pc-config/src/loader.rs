//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError, StoreBackend};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "portcullis.toml",
    "./config/config.toml",
    "./config/portcullis.toml",
    "/etc/portcullis/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found), apply environment overrides, validate.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = match self.find_config_file() {
            Some(path) => {
                info!(?path, "Loading configuration from file");
                AppConfig::from_file(&path)?
            }
            None => AppConfig::default(),
        };

        apply_overrides(&mut config, |key| env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!(?path, "Configured path does not exist, searching defaults");
        }

        if let Ok(path) = env::var("PORTCULLIS_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `PORTCULLIS_*` overrides read through `lookup`.
///
/// Unparseable numeric or boolean values are ignored, leaving the file value.
pub fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    fn parse_into<T: std::str::FromStr>(value: Option<String>, target: &mut T) {
        if let Some(parsed) = value.and_then(|v| v.trim().parse().ok()) {
            *target = parsed;
        }
    }

    // HTTP
    parse_into(lookup("PORTCULLIS_HTTP_PORT"), &mut config.http.port);
    if let Some(val) = lookup("PORTCULLIS_HTTP_HOST") {
        config.http.host = val;
    }
    if let Some(val) = lookup("PORTCULLIS_CORS_ORIGINS") {
        config.http.cors_origins = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    // MongoDB
    if let Some(val) = lookup("PORTCULLIS_MONGODB_URI") {
        config.mongodb.uri = val;
    }
    if let Some(val) = lookup("PORTCULLIS_MONGODB_DATABASE") {
        config.mongodb.database = val;
    }

    // Store
    match lookup("PORTCULLIS_STORE_BACKEND").as_deref().map(str::trim) {
        Some("memory") => config.store.backend = StoreBackend::Memory,
        Some("mongodb") => config.store.backend = StoreBackend::Mongodb,
        Some(other) => warn!(backend = other, "Ignoring unknown PORTCULLIS_STORE_BACKEND"),
        None => {}
    }

    // Auth
    if let Some(val) = lookup("PORTCULLIS_EXTERNAL_BASE") {
        config.auth.external_base = val;
    }
    parse_into(lookup("PORTCULLIS_STATE_TTL_SECS"), &mut config.auth.state_ttl_secs);
    parse_into(lookup("PORTCULLIS_SESSION_TTL_SECS"), &mut config.auth.session_ttl_secs);
    parse_into(lookup("PORTCULLIS_HTTP_TIMEOUT_SECS"), &mut config.auth.http_timeout_secs);
    parse_into(lookup("PORTCULLIS_STORE_TIMEOUT_SECS"), &mut config.auth.store_timeout_secs);
    parse_into(lookup("PORTCULLIS_REAPER_INTERVAL_SECS"), &mut config.auth.reaper_interval_secs);
    if let Some(val) = lookup("PORTCULLIS_SESSION_COOKIE_NAME") {
        config.auth.session.cookie_name = val;
    }
    parse_into(lookup("PORTCULLIS_SESSION_COOKIE_SECURE"), &mut config.auth.session.secure);

    // General
    parse_into(lookup("PORTCULLIS_DEV_MODE"), &mut config.dev_mode);
}
