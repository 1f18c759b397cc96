//! Shared fixtures: in-memory stores wired to a wiremock provider.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pc_identity::{
    Argon2Config, AuthError, ClientRegistry, FlowOrchestrator, FlowSettings, LocalAuthService,
    MemoryClientRegistry, MemoryLedger, MemoryStateStore, MemoryTokenStore, NewToken, OAuth2Token,
    PasswordPolicy, PasswordService, PkceMethod, Provider, ProviderHttpClient, ProviderRegistry,
    RegisteredClient, TokenStore,
};

pub const TENANT: &str = "t1";
pub const PROVIDER: &str = "github";
pub const CLIENT_ID: &str = "c1";
pub const REDIRECT_URI: &str = "https://app/cb";
pub const ACCESS_TOKEN: &str = "gho_test_access";

pub struct Harness {
    pub server: MockServer,
    pub providers: Arc<ProviderRegistry>,
    pub clients: Arc<MemoryClientRegistry>,
    pub states: Arc<MemoryStateStore>,
    pub tokens: Arc<MemoryTokenStore>,
    pub ledger: Arc<MemoryLedger>,
    pub flow: FlowOrchestrator,
    pub local: LocalAuthService,
}

pub fn github_provider(server: &MockServer) -> Provider {
    Provider::new(
        PROVIDER,
        format!("{}/login/oauth/authorize", server.uri()),
        format!("{}/login/oauth/access_token", server.uri()),
        format!("{}/user", server.uri()),
    )
}

pub fn default_client() -> RegisteredClient {
    RegisteredClient::new(TENANT, PROVIDER, CLIENT_ID, REDIRECT_URI)
        .with_secret("s3cret")
        .with_scope(["read:user"])
        .with_pkce_method(PkceMethod::S256)
}

pub fn password_service() -> Arc<PasswordService> {
    Arc::new(PasswordService::new(Argon2Config::testing(), PasswordPolicy::lenient()).unwrap())
}

pub async fn harness() -> Harness {
    harness_with_tokens(None).await
}

/// `tokens` replaces the flow's token store when given (failure injection).
pub async fn harness_with_tokens(tokens: Option<Arc<dyn TokenStore>>) -> Harness {
    let server = MockServer::start().await;

    let providers = Arc::new(ProviderRegistry::new());
    providers.register(github_provider(&server)).unwrap();

    let clients = Arc::new(MemoryClientRegistry::new(providers.clone()));
    clients.register(default_client()).await.unwrap();

    let states = Arc::new(MemoryStateStore::new());
    let memory_tokens = Arc::new(MemoryTokenStore::new());
    let ledger = Arc::new(MemoryLedger::new());

    let flow = FlowOrchestrator::new(
        providers.clone(),
        clients.clone(),
        states.clone(),
        tokens.unwrap_or_else(|| memory_tokens.clone() as Arc<dyn TokenStore>),
        ledger.clone(),
        ProviderHttpClient::new(Duration::from_secs(5)).unwrap(),
        FlowSettings::default(),
    );
    let local = LocalAuthService::new(ledger.clone(), password_service(), chrono::Duration::hours(1));

    Harness {
        server,
        providers,
        clients,
        states,
        tokens: memory_tokens,
        ledger,
        flow,
        local,
    }
}

impl Harness {
    /// Token endpoint answering with a bearer token.
    pub async fn mock_token_ok(&self) {
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": ACCESS_TOKEN,
                "token_type": "bearer",
                "scope": "read:user",
                "refresh_token": "ghr_refresh",
                "expires_in": 28800
            })))
            .mount(&self.server)
            .await;
    }

    /// User-info endpoint for the GitHub user 42.
    pub async fn mock_userinfo_ok(&self) {
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("Authorization", format!("Bearer {}", ACCESS_TOKEN).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 42,
                "login": "octocat",
                "name": "The Octocat",
                "email": "octocat@example.com"
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_provider_ok(&self) {
        self.mock_token_ok().await;
        self.mock_userinfo_ok().await;
    }
}

/// A query parameter of a URL, decoded.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Token store whose writes always fail.
pub struct FailingTokenStore;

#[async_trait]
impl TokenStore for FailingTokenStore {
    async fn save_token(&self, _tenant_id: &str, _token: NewToken) -> pc_identity::Result<OAuth2Token> {
        Err(AuthError::internal("token store unavailable"))
    }

    async fn latest_token(
        &self,
        _tenant_id: &str,
        _user_id: &str,
        _provider: &str,
        _client_id: &str,
    ) -> pc_identity::Result<Option<OAuth2Token>> {
        Ok(None)
    }

    async fn list_tokens(&self, _tenant_id: &str, _user_id: &str) -> pc_identity::Result<Vec<OAuth2Token>> {
        Ok(Vec::new())
    }
}

/// Token store that crashes the calling task on write.
pub struct PanickingTokenStore;

#[async_trait]
impl TokenStore for PanickingTokenStore {
    async fn save_token(&self, _tenant_id: &str, _token: NewToken) -> pc_identity::Result<OAuth2Token> {
        panic!("token store crashed");
    }

    async fn latest_token(
        &self,
        _tenant_id: &str,
        _user_id: &str,
        _provider: &str,
        _client_id: &str,
    ) -> pc_identity::Result<Option<OAuth2Token>> {
        Ok(None)
    }

    async fn list_tokens(&self, _tenant_id: &str, _user_id: &str) -> pc_identity::Result<Vec<OAuth2Token>> {
        Ok(Vec::new())
    }
}
