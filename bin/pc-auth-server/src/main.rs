//! Portcullis Auth Server
//!
//! Serves tenant login over registered OAuth2 providers and local
//! email/password accounts:
//! - `/t/{tenant}/login/{provider}` and its `/callback`
//! - `/t/{tenant}/password/*`, `/t/{tenant}/session`, `/t/{tenant}/logout`
//! - `/health`
//!
//! ## Configuration
//!
//! Read from `config.toml` (or `PORTCULLIS_CONFIG`), then overridden by
//! `PORTCULLIS_*` environment variables. `LOG_FORMAT=json` and `RUST_LOG`
//! control logging.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::{http::HeaderValue, response::Json, routing::get, Router};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use pc_config::{AppConfig, ClientConfig, ProviderConfig, StoreBackend};
use pc_identity::{
    initialize_indexes, login_router, Argon2Config, ClientRegistry, FlowOrchestrator, FlowSettings,
    Ledger, LocalAuthService, LoginApiState, MemoryClientRegistry, MemoryLedger, MemoryStateStore,
    MemoryTokenStore, MongoClientRegistry, MongoLedger, MongoStateStore, MongoTokenStore, PasswordPolicy,
    PasswordService, Provider, ProviderHttpClient, ProviderRegistry, RegisteredClient, SessionCookieSettings,
    StateReaper, StateStore, TokenStore,
};

/// The four persistence seams, backed by one store kind.
struct Stores {
    clients: Arc<dyn ClientRegistry>,
    states: Arc<dyn StateStore>,
    tokens: Arc<dyn TokenStore>,
    ledger: Arc<dyn Ledger>,
}

#[tokio::main]
async fn main() -> Result<()> {
    pc_common::logging::init_logging("pc-auth-server");

    info!("Starting Portcullis Auth Server");

    let config = AppConfig::load().context("loading configuration")?;
    if config.dev_mode {
        warn!("Development mode enabled, session cookies are not marked Secure");
    }

    let providers = Arc::new(build_providers(&config)?);
    info!(count = providers.list().len(), "Providers registered");

    let stores = open_stores(&config, providers.clone()).await?;
    register_clients(&config, stores.clients.as_ref()).await?;

    let auth = &config.auth;
    let settings = FlowSettings {
        state_ttl: chrono_secs("auth.state_ttl_secs", auth.state_ttl_secs)?,
        session_ttl: chrono_secs("auth.session_ttl_secs", auth.session_ttl_secs)?,
        store_timeout: Duration::from_secs(auth.store_timeout_secs),
    };
    let http = ProviderHttpClient::new(Duration::from_secs(auth.http_timeout_secs))?;

    let password = &config.password;
    let passwords = Arc::new(PasswordService::new(
        Argon2Config {
            memory_cost: password.argon2_memory_kib,
            time_cost: password.argon2_time_cost,
            parallelism: password.argon2_parallelism,
        },
        PasswordPolicy {
            min_length: password.min_length,
            max_length: password.max_length,
            require_uppercase: password.require_uppercase,
            require_lowercase: password.require_lowercase,
            require_digit: password.require_digit,
            require_special: password.require_special,
        },
    )?);

    let local = LocalAuthService::new(stores.ledger.clone(), passwords, settings.session_ttl);
    let flow = FlowOrchestrator::new(
        providers,
        stores.clients.clone(),
        stores.states.clone(),
        stores.tokens.clone(),
        stores.ledger.clone(),
        http,
        settings,
    );

    let reaper = StateReaper::new(stores.states.clone(), Duration::from_secs(auth.reaper_interval_secs)).spawn();

    let cookie = SessionCookieSettings {
        name: auth.session.cookie_name.clone(),
        secure: auth.session.secure && !config.dev_mode,
        same_site: auth.session.same_site.clone(),
    };
    let login_state = LoginApiState::new(flow, local)
        .with_cookie_settings(cookie)
        .with_external_base(Some(auth.external_base.clone()).filter(|b| !b.trim().is_empty()));

    let app = Router::new()
        .route("/health", get(health_handler))
        .merge(login_router(login_state))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.http.cors_origins));

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Auth server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper.abort();
    info!("Portcullis Auth Server shutdown complete");
    Ok(())
}

/// Presets first, then configured providers (which may replace a preset).
fn build_providers(config: &AppConfig) -> Result<ProviderRegistry> {
    let registry = ProviderRegistry::new();

    for id in &config.builtin_providers {
        let provider = Provider::preset(id).ok_or_else(|| anyhow!("unknown built-in provider: {}", id))?;
        registry.register(provider)?;
    }
    for provider in &config.providers {
        registry.register(provider_from_config(provider))?;
    }

    Ok(registry)
}

fn provider_from_config(config: &ProviderConfig) -> Provider {
    Provider::new(
        config.id.trim(),
        &config.authorize_url,
        &config.token_url,
        &config.userinfo_url,
    )
    .with_pkce_required(config.pkce_required)
}

async fn register_clients(config: &AppConfig, registry: &dyn ClientRegistry) -> Result<()> {
    for client in &config.clients {
        let registered = client_from_config(client, &config.auth.external_base)?;
        registry
            .register(registered)
            .await
            .with_context(|| format!("registering client {} for tenant {}", client.client_id, client.tenant_id))?;
        info!(tenant_id = %client.tenant_id, provider = %client.provider, client_id = %client.client_id, "Client registered");
    }
    Ok(())
}

fn client_from_config(config: &ClientConfig, external_base: &str) -> Result<RegisteredClient> {
    // Relative redirect URIs are served by this process.
    let redirect_uri = if config.redirect_uri.starts_with('/') {
        format!("{}{}", external_base.trim_end_matches('/'), config.redirect_uri)
    } else {
        config.redirect_uri.clone()
    };

    Ok(
        RegisteredClient::new(&config.tenant_id, &config.provider, &config.client_id, redirect_uri)
            .with_secret(config.client_secret.clone())
            .with_scope(config.scope.iter().map(String::as_str))
            .with_pkce_method(config.pkce_method.parse()?),
    )
}

async fn open_stores(config: &AppConfig, providers: Arc<ProviderRegistry>) -> Result<Stores> {
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory stores, all state is lost on restart");
            Ok(Stores {
                clients: Arc::new(MemoryClientRegistry::new(providers)),
                states: Arc::new(MemoryStateStore::new()),
                tokens: Arc::new(MemoryTokenStore::new()),
                ledger: Arc::new(MemoryLedger::new()),
            })
        }
        StoreBackend::Mongodb => {
            info!("Connecting to MongoDB: {}", config.mongodb.database);
            let client = mongodb::Client::with_uri_str(&config.mongodb.uri).await?;
            let db = client.database(&config.mongodb.database);

            initialize_indexes(&db).await.context("creating MongoDB indexes")?;
            info!("MongoDB indexes initialized");

            Ok(Stores {
                clients: Arc::new(MongoClientRegistry::new(&db, providers)),
                states: Arc::new(MongoStateStore::new(&db)),
                tokens: Arc::new(MongoTokenStore::new(&db)),
                ledger: Arc::new(MongoLedger::new(&db)),
            })
        }
    }
}

fn chrono_secs(name: &str, secs: u64) -> Result<chrono::Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| anyhow!("{} is out of range", name))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
