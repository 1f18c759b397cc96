//! OAuth2 Login Flow
//!
//! `begin_login` resolves provider and client, issues a login state and
//! builds the authorize URL. `complete_login` consumes that state and then
//! exchanges the code, fetches user info and writes identity, session and
//! token.
//!
//! Stages: INITIATED -> AWAITING_CALLBACK -> TOKEN_EXCHANGED -> USER_RESOLVED
//! -> COMPLETE, with FAILED reachable from each. AWAITING_CALLBACK is the
//! existence of the stored state; nothing else records the stage.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::client::{ClientRegistry, RegisteredClient};
use crate::flow::pkce::{code_challenge, generate_code_verifier};
use crate::flow::provider_client::{ProviderHttpClient, TokenResponse, UserInfo};
use crate::flow::scope::{normalize_scope, ScopeRequest};
use crate::ledger::{
    oauth_provider_type, Identity, IdentityClaim, Ledger, Session, SessionContext, UserProfile,
};
use crate::provider::{Provider, ProviderRegistry};
use crate::shared::error::{AuthError, Result};
use crate::state::{AuthState, NewAuthState, StateStore};
use crate::token::{NewToken, TokenStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    Initiated,
    AwaitingCallback,
    TokenExchanged,
    UserResolved,
    Complete,
    Failed,
}

impl FlowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "INITIATED",
            Self::AwaitingCallback => "AWAITING_CALLBACK",
            Self::TokenExchanged => "TOKEN_EXCHANGED",
            Self::UserResolved => "USER_RESOLVED",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub state_ttl: chrono::Duration,
    pub session_ttl: chrono::Duration,
    /// Bound on every state store and ledger call
    pub store_timeout: std::time::Duration,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            state_ttl: chrono::Duration::minutes(10),
            session_ttl: chrono::Duration::hours(24),
            store_timeout: std::time::Duration::from_secs(5),
        }
    }
}

/// Input to `begin_login`.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub tenant_id: String,
    pub provider_id: String,
    /// First registered client for the provider when absent
    pub client_id: Option<String>,
    /// Must be within the client's allowed scope; the client's scope when absent
    pub scope: Option<ScopeRequest>,
    pub return_url: Option<String>,
}

impl LoginRequest {
    pub fn new(tenant_id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            provider_id: provider_id.into(),
            client_id: None,
            scope: None,
            return_url: None,
        }
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<ScopeRequest>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_return_url(mut self, return_url: impl Into<String>) -> Self {
        self.return_url = Some(return_url.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct LoginRedirect {
    pub authorize_url: String,
    pub state: String,
    pub expires_at: DateTime<Utc>,
}

/// Input to `complete_login`.
#[derive(Debug, Clone)]
pub struct CallbackRequest {
    pub tenant_id: String,
    pub code: String,
    pub state: String,
    /// Provider named by the callback route, checked against the state
    pub expected_provider: Option<String>,
    pub context: SessionContext,
}

impl CallbackRequest {
    pub fn new(tenant_id: impl Into<String>, code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            code: code.into(),
            state: state.into(),
            expected_provider: None,
            context: SessionContext::default(),
        }
    }

    pub fn with_expected_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.expected_provider = Some(provider_id.into());
        self
    }

    pub fn with_context(mut self, context: SessionContext) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session: Session,
    pub identity: Identity,
    pub provider_id: String,
    pub client_id: String,
    pub return_url: Option<String>,
}

#[derive(Clone)]
pub struct FlowOrchestrator {
    providers: Arc<ProviderRegistry>,
    clients: Arc<dyn ClientRegistry>,
    states: Arc<dyn StateStore>,
    tokens: Arc<dyn TokenStore>,
    ledger: Arc<dyn Ledger>,
    http: ProviderHttpClient,
    settings: FlowSettings,
}

impl FlowOrchestrator {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        clients: Arc<dyn ClientRegistry>,
        states: Arc<dyn StateStore>,
        tokens: Arc<dyn TokenStore>,
        ledger: Arc<dyn Ledger>,
        http: ProviderHttpClient,
        settings: FlowSettings,
    ) -> Self {
        Self {
            providers,
            clients,
            states,
            tokens,
            ledger,
            http,
            settings,
        }
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    pub fn clients(&self) -> &Arc<dyn ClientRegistry> {
        &self.clients
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    /// Start a login: returns the provider URL the browser must visit.
    pub async fn begin_login(&self, request: LoginRequest) -> Result<LoginRedirect> {
        let LoginRequest {
            tenant_id,
            provider_id,
            client_id,
            scope,
            return_url,
        } = request;
        stage(FlowStage::Initiated, &tenant_id, &provider_id);

        let provider = self.providers.get(&provider_id)?;
        let client = self
            .bounded(
                "client lookup",
                self.clients.get(&tenant_id, &provider.id, client_id.as_deref()),
            )
            .await?;

        let scope = resolve_scope(&client, scope)?;

        let verifier = client.pkce_method.is_enabled().then(generate_code_verifier);
        let challenge = verifier
            .as_deref()
            .and_then(|v| code_challenge(client.pkce_method, v));

        let new_state = NewAuthState::new(&tenant_id, &provider.id, &client.client_id)
            .with_pkce(client.pkce_method, verifier)
            .with_scope(scope.clone())
            .with_return_url(return_url);
        let issued = self
            .bounded("state issue", self.states.issue(new_state, self.settings.state_ttl))
            .await?;
        let AuthState { state, expires_at, .. } = issued;

        let mut params: Vec<(&str, &str)> = vec![
            ("client_id", client.client_id.as_str()),
            ("redirect_uri", client.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("response_type", "code"),
            ("state", state.as_str()),
        ];
        if let Some(challenge) = challenge.as_deref() {
            params.push(("code_challenge", challenge));
            params.push(("code_challenge_method", client.pkce_method.as_str()));
        }
        let authorize_url = build_url(&provider.authorize_url, &params);

        stage(FlowStage::AwaitingCallback, &tenant_id, &provider.id);
        info!(
            tenant_id = %tenant_id,
            provider = %provider.id,
            client_id = %client.client_id,
            pkce = %client.pkce_method,
            "Login initiated"
        );

        Ok(LoginRedirect {
            authorize_url,
            state,
            expires_at,
        })
    }

    /// Finish a login from the provider callback.
    ///
    /// Once the state is consumed the rest runs on its own task, so a caller
    /// that goes away does not abandon an already exchanged code.
    pub async fn complete_login(&self, request: CallbackRequest) -> Result<LoginOutcome> {
        if request.state.trim().is_empty() {
            return Err(AuthError::invalid_state("missing state"));
        }
        if request.code.trim().is_empty() {
            return Err(AuthError::invalid_argument("missing authorization code"));
        }

        let auth_state = match self
            .bounded("state consume", self.states.consume(&request.state))
            .await
        {
            Ok(state) => state,
            Err(e @ (AuthError::NotFound { .. } | AuthError::Expired)) => {
                // Unknown and expired are indistinguishable to the caller.
                warn!(tenant_id = %request.tenant_id, reason = e.code(), "Callback with unusable state");
                return Err(AuthError::invalid_state("unknown or expired state"));
            }
            Err(e) => return Err(e),
        };

        if auth_state.tenant_id != request.tenant_id {
            warn!(
                tenant_id = %request.tenant_id,
                state_tenant = %auth_state.tenant_id,
                "Callback tenant does not match login state"
            );
            return Err(AuthError::invalid_state("tenant mismatch"));
        }
        if let Some(expected) = request.expected_provider.as_deref() {
            if expected != auth_state.provider_id {
                warn!(
                    tenant_id = %request.tenant_id,
                    provider = %expected,
                    state_provider = %auth_state.provider_id,
                    "Callback provider does not match login state"
                );
                return Err(AuthError::invalid_state("provider mismatch"));
            }
        }

        let this = self.clone();
        let tenant_id = auth_state.tenant_id.clone();
        let provider_id = auth_state.provider_id.clone();
        let opened = Arc::new(Mutex::new(None::<String>));
        let task = tokio::spawn({
            let opened = opened.clone();
            async move {
                this.finish_login(auth_state, request.code, request.context, &opened)
                    .await
            }
        });

        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                // The task died mid-flight; a session it opened has no token behind it.
                let session_id = opened.lock().take();
                error!(
                    tenant_id = %tenant_id,
                    provider = %provider_id,
                    session_id = session_id.as_deref().unwrap_or("-"),
                    error = %e,
                    "Login task aborted"
                );
                if let Some(session_id) = session_id {
                    self.withdraw_session(&tenant_id, &session_id).await;
                }
                Err(AuthError::login_failed("login task aborted"))
            }
        };
        if let Err(e) = &result {
            stage(FlowStage::Failed, &tenant_id, &provider_id);
            warn!(tenant_id = %tenant_id, provider = %provider_id, error = %e, "Login failed");
        }
        result
    }

    async fn finish_login(
        &self,
        auth_state: AuthState,
        code: String,
        context: SessionContext,
        opened: &Mutex<Option<String>>,
    ) -> Result<LoginOutcome> {
        let tenant_id = auth_state.tenant_id.as_str();

        let provider = self.providers.get(&auth_state.provider_id).map_err(|_| {
            AuthError::invalid_state(format!("provider {} no longer registered", auth_state.provider_id))
        })?;
        let client = self.resolve_state_client(&auth_state).await?;

        let token = self
            .http
            .exchange_code(&provider, &client, &code, auth_state.pkce_verifier.as_deref())
            .await?;
        stage(FlowStage::TokenExchanged, tenant_id, &provider.id);

        let info = self.http.fetch_userinfo(&provider, &token.access_token).await?;

        let identity = self
            .bounded("identity upsert", self.ledger.upsert_identity(tenant_id, identity_claim(&provider, &info)))
            .await
            .map_err(|e| persistence_failure(&auth_state, "identity upsert", None, e))?;

        let user = self
            .bounded("user lookup", self.ledger.get_user(tenant_id, &identity.user_id))
            .await
            .map_err(|e| persistence_failure(&auth_state, "user lookup", Some(&identity), e))?;
        if !user.is_active() {
            warn!(tenant_id, user_id = %user.id, status = user.status.as_str(), "Login refused for inactive user");
            return Err(AuthError::login_failed("user is not active"));
        }
        stage(FlowStage::UserResolved, tenant_id, &provider.id);

        let session = self
            .bounded(
                "session create",
                self.ledger.create_session(
                    tenant_id,
                    &identity.user_id,
                    &identity.id,
                    self.settings.session_ttl,
                    context,
                ),
            )
            .await
            .map_err(|e| persistence_failure(&auth_state, "session create", Some(&identity), e))?;
        *opened.lock() = Some(session.id.clone());

        let new_token = new_token(&auth_state, &identity, token);
        if let Err(e) = self
            .bounded("token save", self.tokens.save_token(tenant_id, new_token))
            .await
        {
            // No session without its token: withdraw it before reporting.
            self.withdraw_session(tenant_id, &session.id).await;
            *opened.lock() = None;
            return Err(persistence_failure(&auth_state, "token save", Some(&identity), e));
        }

        stage(FlowStage::Complete, tenant_id, &provider.id);
        info!(
            tenant_id,
            provider = %provider.id,
            user_id = %identity.user_id,
            "Login completed"
        );
        *opened.lock() = None;

        Ok(LoginOutcome {
            session,
            identity,
            provider_id: provider.id,
            client_id: client.client_id,
            return_url: auth_state.return_url,
        })
    }

    async fn withdraw_session(&self, tenant_id: &str, session_id: &str) {
        if let Err(e) = self.ledger.delete_session(tenant_id, session_id).await {
            error!(tenant_id, session_id, error = %e, "Failed to withdraw session");
        }
    }

    /// The client must still exist and still be the one the state was issued for.
    async fn resolve_state_client(&self, auth_state: &AuthState) -> Result<RegisteredClient> {
        let client = self
            .bounded(
                "client lookup",
                self.clients.get(&auth_state.tenant_id, &auth_state.provider_id, Some(&auth_state.client_id)),
            )
            .await
            .map_err(|e| match e {
                AuthError::NotFound { .. } => AuthError::invalid_state("client no longer registered"),
                other => other,
            })?;

        if client.client_id != auth_state.client_id || client.tenant_id != auth_state.tenant_id {
            return Err(AuthError::invalid_state("client changed during login"));
        }
        Ok(client)
    }

    async fn bounded<T>(&self, operation: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.settings.store_timeout, fut)
            .await
            .map_err(|_| AuthError::timeout(operation))?
    }
}

fn stage(stage: FlowStage, tenant_id: &str, provider_id: &str) {
    debug!(tenant_id, provider = provider_id, stage = stage.as_str(), "Login flow stage");
}

/// Requested scope when given (and allowed), else the client's scope.
/// A blank request (`?scope=`) falls back to the client's scope like an absent one.
fn resolve_scope(client: &RegisteredClient, requested: Option<ScopeRequest>) -> Result<String> {
    let requested = requested.map(|r| (r.items(), r)).filter(|(items, _)| !items.is_empty());
    let Some((items, requested)) = requested else {
        return Ok(normalize_scope(client.scope.clone()));
    };

    if !client.scope.is_empty() {
        if let Some(extra) = items.iter().find(|s| !client.scope.contains(*s)) {
            return Err(AuthError::invalid_argument(format!(
                "scope {} is not allowed for client {}",
                extra, client.client_id
            )));
        }
    }
    Ok(requested.normalize())
}

fn build_url(base: &str, params: &[(&str, &str)]) -> String {
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, query)
}

fn identity_claim(provider: &Provider, info: &UserInfo) -> IdentityClaim {
    IdentityClaim::new(oauth_provider_type(&provider.id), info.subject.clone())
        .with_props(info.props.clone())
        .with_profile(UserProfile {
            username: info.username.clone(),
            nickname: info.nickname.clone(),
            email: info.email.clone(),
            phone: None,
        })
}

fn new_token(auth_state: &AuthState, identity: &Identity, token: TokenResponse) -> NewToken {
    // Granted scope when the provider reports one, otherwise what was asked for.
    let scope = token
        .scope
        .map(|granted| normalize_scope(granted))
        .unwrap_or_else(|| auth_state.scope.clone());
    NewToken {
        user_id: identity.user_id.clone(),
        provider: auth_state.provider_id.clone(),
        client_id: auth_state.client_id.clone(),
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        token_type: token.token_type,
        scope,
        expires_in: token.expires_in,
    }
}

/// Log enough to reconcile by hand, return a generic failure.
fn persistence_failure(
    auth_state: &AuthState,
    step: &str,
    identity: Option<&Identity>,
    err: AuthError,
) -> AuthError {
    error!(
        tenant_id = %auth_state.tenant_id,
        provider = %auth_state.provider_id,
        client_id = %auth_state.client_id,
        identity_id = identity.map(|i| i.id.as_str()).unwrap_or("-"),
        user_id = identity.map(|i| i.user_id.as_str()).unwrap_or("-"),
        step,
        error = %err,
        "Login persistence failed after token exchange"
    );
    AuthError::login_failed(format!("{} failed", step))
}
