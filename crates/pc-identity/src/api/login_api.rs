//! Login Endpoints
//!
//! All routes are tenant-scoped under `/t/{tenant}`:
//! 1. GET  /login/{provider}           - 303 to the provider's authorize URL
//! 2. POST /login/{provider}           - the same URL as JSON
//! 3. GET  /login/{provider}/callback  - completes the login, sets the session cookie
//! 4. POST /password/signup | /password/login | /password/reset
//! 5. GET  /session, POST /session/refresh, POST /logout

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::flow::{CallbackRequest, FlowOrchestrator, LoginRequest, ScopeRequest};
use crate::ledger::{Session, SessionContext, UserProfile, EMAIL_PROVIDER_TYPE};
use crate::local::{normalize_email, LocalAuthService};
use crate::shared::error::{AuthError, Result};

/// Session cookie settings
#[derive(Debug, Clone)]
pub struct SessionCookieSettings {
    pub name: String,
    pub secure: bool,
    pub same_site: String,
}

impl Default for SessionCookieSettings {
    fn default() -> Self {
        Self {
            name: "PORTCULLIS_SESSION".to_string(),
            secure: true,
            same_site: "Lax".to_string(),
        }
    }
}

impl SessionCookieSettings {
    fn same_site(&self) -> SameSite {
        match self.same_site.to_lowercase().as_str() {
            "strict" => SameSite::Strict,
            "none" => SameSite::None,
            _ => SameSite::Lax,
        }
    }

    fn session_cookie(&self, session: &Session) -> Cookie<'static> {
        Cookie::build((self.name.clone(), session.auth_token.clone()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site())
            .max_age(time::Duration::seconds(session.remaining_secs()))
            .build()
    }

    fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.name.clone(), "")).path("/").build()
    }
}

/// Login API State
#[derive(Clone)]
pub struct LoginApiState {
    pub flow: FlowOrchestrator,
    pub local: LocalAuthService,
    pub cookie: SessionCookieSettings,
    /// Absolute return URLs must start with this (e.g. "https://app.example.com")
    pub external_base: Option<String>,
}

impl LoginApiState {
    pub fn new(flow: FlowOrchestrator, local: LocalAuthService) -> Self {
        Self {
            flow,
            local,
            cookie: SessionCookieSettings::default(),
            external_base: None,
        }
    }

    pub fn with_cookie_settings(mut self, cookie: SessionCookieSettings) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_external_base(mut self, base: Option<String>) -> Self {
        self.external_base = base.map(|b| b.trim_end_matches('/').to_string());
        self
    }

    /// Relative paths, or absolute URLs under `external_base`. Anything else
    /// would make the login an open redirect.
    fn accept_return_url(&self, url: Option<String>) -> Result<Option<String>> {
        let Some(url) = url.filter(|u| !u.is_empty()) else {
            return Ok(None);
        };
        let relative = url.starts_with('/') && !url.starts_with("//") && !url.contains('\\');
        let under_base = self
            .external_base
            .as_deref()
            .is_some_and(|base| url == base || url.starts_with(&format!("{}/", base)));
        if relative || under_base {
            Ok(Some(url))
        } else {
            Err(AuthError::invalid_argument("return_url must be a path on this site"))
        }
    }
}

// ==================== Request/Response Types ====================

#[derive(Debug, Default, Deserialize)]
pub struct BeginLoginParams {
    pub client_id: Option<String>,
    pub scope: Option<String>,
    pub return_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginLoginBody {
    pub client_id: Option<String>,
    /// Space-delimited string or list
    pub scope: Option<ScopeRequest>,
    pub return_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginLoginResponse {
    pub authorize_url: String,
    pub state: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Returned wherever a session is opened or inspected.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    pub user_id: String,
    pub identity_id: String,
    /// Bearer token; omitted when only inspecting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl SessionResponse {
    fn with_token(session: &Session) -> Self {
        Self {
            auth_token: Some(session.auth_token.clone()),
            ..Self::without_token(session)
        }
    }

    fn without_token(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
            identity_id: session.identity_id.clone(),
            auth_token: None,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub user_id: String,
    pub identity_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordLoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetRequest {
    pub email: String,
    pub new_password: String,
}

// ==================== Endpoints ====================

/// Redirect the browser to the provider.
pub async fn begin_login_redirect(
    State(state): State<LoginApiState>,
    Path((tenant_id, provider_id)): Path<(String, String)>,
    Query(params): Query<BeginLoginParams>,
) -> Result<Response> {
    let request = LoginRequest {
        tenant_id,
        provider_id,
        client_id: params.client_id,
        scope: params.scope.filter(|s| !s.trim().is_empty()).map(ScopeRequest::from),
        return_url: state.accept_return_url(params.return_url)?,
    };
    let redirect = state.flow.begin_login(request).await?;

    Ok((StatusCode::SEE_OTHER, [(header::LOCATION, redirect.authorize_url)]).into_response())
}

/// Authorize URL as JSON, for clients that navigate themselves.
pub async fn begin_login_json(
    State(state): State<LoginApiState>,
    Path((tenant_id, provider_id)): Path<(String, String)>,
    Json(body): Json<BeginLoginBody>,
) -> Result<Json<BeginLoginResponse>> {
    let request = LoginRequest {
        tenant_id,
        provider_id,
        client_id: body.client_id,
        scope: body.scope,
        return_url: state.accept_return_url(body.return_url)?,
    };
    let redirect = state.flow.begin_login(request).await?;

    Ok(Json(BeginLoginResponse {
        authorize_url: redirect.authorize_url,
        state: redirect.state,
        expires_at: redirect.expires_at,
    }))
}

/// Provider callback: completes the login and opens a session.
pub async fn login_callback(
    State(state): State<LoginApiState>,
    Path((tenant_id, provider_id)): Path<(String, String)>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response> {
    if let Some(error) = &params.error {
        warn!(
            tenant_id = %tenant_id,
            provider = %provider_id,
            error = %error,
            description = params.error_description.as_deref().unwrap_or(""),
            "Provider returned an error to the callback"
        );
        return Err(AuthError::invalid_argument(format!("provider returned error: {}", error)));
    }

    let request = CallbackRequest::new(
        tenant_id,
        params.code.unwrap_or_default(),
        params.state.unwrap_or_default(),
    )
    .with_expected_provider(provider_id)
    .with_context(session_context(&headers));

    let outcome = state.flow.complete_login(request).await?;
    let jar = jar.add(state.cookie.session_cookie(&outcome.session));

    let response = match outcome.return_url {
        Some(url) => (jar, (StatusCode::SEE_OTHER, [(header::LOCATION, url)])).into_response(),
        None => (jar, Json(SessionResponse::with_token(&outcome.session))).into_response(),
    };
    Ok(response)
}

pub async fn password_signup(
    State(state): State<LoginApiState>,
    Path(tenant_id): Path<String>,
    Json(body): Json<SignupRequest>,
) -> Result<Response> {
    let profile = UserProfile {
        username: body.username,
        nickname: body.nickname,
        email: None,
        phone: body.phone,
    };
    let identity = state
        .local
        .signup_with_password(&tenant_id, &body.email, &body.password, profile)
        .await?;

    let body = SignupResponse {
        user_id: identity.user_id,
        identity_id: identity.id,
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub async fn password_login(
    State(state): State<LoginApiState>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<PasswordLoginRequest>,
) -> Result<Response> {
    let login = state
        .local
        .login_with_password(&tenant_id, &body.email, &body.password, session_context(&headers))
        .await?;

    let jar = jar.add(state.cookie.session_cookie(&login.session));
    Ok((jar, Json(SessionResponse::with_token(&login.session))).into_response())
}

/// Change the password of the caller's own local account.
pub async fn password_reset(
    State(state): State<LoginApiState>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<PasswordResetRequest>,
) -> Result<StatusCode> {
    let session = current_session(&state, &tenant_id, &headers, &jar).await?;

    let email = normalize_email(&body.email)?;
    let owned = state
        .flow
        .ledger()
        .find_identity(&tenant_id, EMAIL_PROVIDER_TYPE, &email)
        .await?
        .is_some_and(|identity| identity.user_id == session.user_id);
    if !owned {
        return Err(AuthError::not_found("Identity", format!("{}/{}", EMAIL_PROVIDER_TYPE, email)));
    }

    state.local.reset_password(&tenant_id, &email, &body.new_password).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_session(
    State(state): State<LoginApiState>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Json<SessionResponse>> {
    let session = current_session(&state, &tenant_id, &headers, &jar).await?;
    Ok(Json(SessionResponse::without_token(&session)))
}

pub async fn refresh_session(
    State(state): State<LoginApiState>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response> {
    let session = current_session(&state, &tenant_id, &headers, &jar).await?;
    let refreshed = state
        .flow
        .ledger()
        .refresh_session(&tenant_id, &session.id, state.flow.settings().session_ttl)
        .await?;

    let jar = jar.add(state.cookie.session_cookie(&refreshed));
    Ok((jar, Json(SessionResponse::without_token(&refreshed))).into_response())
}

pub async fn logout(
    State(state): State<LoginApiState>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response> {
    let session = current_session(&state, &tenant_id, &headers, &jar).await?;
    state.flow.ledger().delete_session(&tenant_id, &session.id).await?;
    info!(tenant_id = %tenant_id, user_id = %session.user_id, "Logged out");

    let jar = jar.remove(state.cookie.removal_cookie());
    Ok((jar, StatusCode::NO_CONTENT).into_response())
}

// ==================== Helper Functions ====================

/// Bearer token first, then the session cookie.
fn session_token(headers: &HeaderMap, jar: &CookieJar, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    bearer.or_else(|| jar.get(cookie_name).map(|c| c.value().to_string()))
}

async fn current_session(
    state: &LoginApiState,
    tenant_id: &str,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> Result<Session> {
    let token = session_token(headers, jar, &state.cookie.name).ok_or(AuthError::InvalidCredentials)?;
    state
        .flow
        .ledger()
        .find_session(tenant_id, &token)
        .await?
        .ok_or(AuthError::InvalidCredentials)
}

fn session_context(headers: &HeaderMap) -> SessionContext {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let ip_address = header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .or_else(|| header_str("x-real-ip"));

    SessionContext {
        user_agent: header_str(header::USER_AGENT.as_str()),
        ip_address,
    }
}

pub fn login_router(state: LoginApiState) -> Router {
    Router::new()
        .route("/t/:tenant/login/:provider", get(begin_login_redirect).post(begin_login_json))
        .route("/t/:tenant/login/:provider/callback", get(login_callback))
        .route("/t/:tenant/password/signup", post(password_signup))
        .route("/t/:tenant/password/login", post(password_login))
        .route("/t/:tenant/password/reset", post(password_reset))
        .route("/t/:tenant/session", get(get_session))
        .route("/t/:tenant/session/refresh", post(refresh_session))
        .route("/t/:tenant/logout", post(logout))
        .with_state(state)
}
