//! Portcullis Configuration System
//!
//! TOML-based configuration with environment variable overrides. Registered
//! providers and tenant clients are declared here and loaded into the
//! registries at process start.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::{apply_overrides, ConfigLoader};

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub mongodb: MongoConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub password: PasswordConfig,

    /// Built-in provider presets to register before `providers` (github, google, gitlab)
    pub builtin_providers: Vec<String>,

    /// Custom providers; an id matching a preset replaces it
    pub providers: Vec<ProviderConfig>,

    /// Tenant OAuth2 clients
    pub clients: Vec<ClientConfig>,

    /// Enable development mode
    pub dev_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            mongodb: MongoConfig::default(),
            store: StoreConfig::default(),
            auth: AuthConfig::default(),
            password: PasswordConfig::default(),
            builtin_providers: Vec::new(),
            providers: Vec::new(),
            clients: Vec::new(),
            dev_mode: false,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            cors_origins: vec!["http://localhost:4200".to_string()],
        }
    }
}

/// MongoDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "portcullis".to_string(),
        }
    }
}

/// Where states, tokens and the ledger live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongodb,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Mongodb,
        }
    }
}

/// Login flow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// External base URL, used when a client redirect_uri is relative
    pub external_base: String,
    /// Lifetime of an issued login state
    pub state_ttl_secs: u64,
    /// Lifetime of a new session, also the extension applied on refresh
    pub session_ttl_secs: u64,
    /// Timeout for token exchange and userinfo calls
    pub http_timeout_secs: u64,
    /// Timeout for each ledger/token store write during login completion
    pub store_timeout_secs: u64,
    /// How often expired login states are reaped
    pub reaper_interval_secs: u64,
    pub session: SessionCookieConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            external_base: "http://localhost:8080".to_string(),
            state_ttl_secs: 600,      // 10 minutes
            session_ttl_secs: 86400,  // 24 hours
            http_timeout_secs: 10,
            store_timeout_secs: 5,
            reaper_interval_secs: 60,
            session: SessionCookieConfig::default(),
        }
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionCookieConfig {
    pub cookie_name: String,
    pub secure: bool,
    pub same_site: String,
}

impl Default for SessionCookieConfig {
    fn default() -> Self {
        Self {
            cookie_name: "PORTCULLIS_SESSION".to_string(),
            secure: true,
            same_site: "Lax".to_string(),
        }
    }
}

/// Local credential policy and Argon2id cost parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
    /// Memory cost in KiB
    pub argon2_memory_kib: u32,
    pub argon2_time_cost: u32,
    pub argon2_parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 12,
            max_length: 128,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: false,
            argon2_memory_kib: 65536, // 64 MiB
            argon2_time_cost: 3,
            argon2_parallelism: 4,
        }
    }
}

/// A provider declared in configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub id: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub pkce_required: bool,
}

/// A tenant's OAuth2 client for one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub tenant_id: String,
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: Vec<String>,
    pub redirect_uri: String,
    /// none, S256 or plain
    pub pkce_method: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            provider: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: Vec::new(),
            redirect_uri: String::new(),
            pkce_method: "S256".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Reject values that would make the login flow misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let auth = &self.auth;
        for (name, value) in [
            ("auth.state_ttl_secs", auth.state_ttl_secs),
            ("auth.session_ttl_secs", auth.session_ttl_secs),
            ("auth.http_timeout_secs", auth.http_timeout_secs),
            ("auth.store_timeout_secs", auth.store_timeout_secs),
            ("auth.reaper_interval_secs", auth.reaper_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!("{} must be greater than zero", name)));
            }
        }

        if self.password.min_length > self.password.max_length {
            return Err(ConfigError::ValidationError(
                "password.min_length exceeds password.max_length".to_string(),
            ));
        }

        if self.store.backend == StoreBackend::Mongodb && self.mongodb.uri.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "mongodb.uri is required when store.backend = \"mongodb\"".to_string(),
            ));
        }

        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return Err(ConfigError::ValidationError("provider id must not be empty".to_string()));
            }
        }

        for client in &self.clients {
            if !matches!(client.pkce_method.as_str(), "none" | "S256" | "plain") {
                return Err(ConfigError::ValidationError(format!(
                    "client {} has unknown pkce_method {:?}",
                    client.client_id, client.pkce_method
                )));
            }
        }

        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Portcullis Configuration
# Environment variables (PORTCULLIS_*) override these settings

builtin_providers = ["github"]
dev_mode = false

[http]
port = 8080
host = "0.0.0.0"
cors_origins = ["http://localhost:4200"]

[mongodb]
uri = "mongodb://localhost:27017"
database = "portcullis"

[store]
backend = "mongodb"  # mongodb or memory

[auth]
external_base = "http://localhost:8080"
state_ttl_secs = 600
session_ttl_secs = 86400
http_timeout_secs = 10
store_timeout_secs = 5
reaper_interval_secs = 60

[auth.session]
cookie_name = "PORTCULLIS_SESSION"
secure = true
same_site = "Lax"

[password]
min_length = 12
max_length = 128
require_uppercase = true
require_lowercase = true
require_digit = true
require_special = false
argon2_memory_kib = 65536
argon2_time_cost = 3
argon2_parallelism = 4

[[providers]]
id = "acme"
authorize_url = "https://sso.acme.test/oauth/authorize"
token_url = "https://sso.acme.test/oauth/token"
userinfo_url = "https://sso.acme.test/oauth/userinfo"
pkce_required = true

[[clients]]
tenant_id = "t1"
provider = "github"
client_id = "c1"
client_secret = "change-me"
scope = ["read:user", "user:email"]
redirect_uri = "https://app.example.com/login/github/callback"
pkce_method = "S256"  # none, S256 or plain
"#
        .to_string()
    }
}
