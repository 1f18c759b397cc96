//! Login flow integration tests
//!
//! Full begin/complete round trips against a wiremock provider with the
//! in-memory stores.

mod common;

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::*;
use pc_identity::state::NewAuthState;
use pc_identity::{
    AuthError, CallbackRequest, ClientRegistry, Ledger, LoginRequest, PkceMethod, RegisteredClient,
    SessionContext, TokenStore, UserPatch, UserStatus,
};

// ============================================================================
// begin_login
// ============================================================================

#[tokio::test]
async fn test_begin_login_builds_authorize_url() {
    let h = harness().await;

    let redirect = h
        .flow
        .begin_login(LoginRequest::new(TENANT, PROVIDER))
        .await
        .unwrap();

    let url = &redirect.authorize_url;
    assert!(url.starts_with(&format!("{}/login/oauth/authorize?", h.server.uri())));
    assert!(url.contains("scope=read%3Auser"));
    assert!(url.contains("response_type=code"));
    assert!(url.contains("code_challenge_method=S256"));
    assert_eq!(query_param(url, "client_id").as_deref(), Some(CLIENT_ID));
    assert_eq!(query_param(url, "redirect_uri").as_deref(), Some(REDIRECT_URI));
    assert_eq!(query_param(url, "state").as_deref(), Some(redirect.state.as_str()));
    assert!(redirect.state.len() >= 16);

    let stored = h.states.peek(&redirect.state).expect("state persisted");
    assert_eq!(stored.tenant_id, TENANT);
    assert_eq!(redirect.expires_at, stored.expires_at);
    assert_eq!(stored.client_id, CLIENT_ID);
    assert_eq!(stored.scope, "read:user");
    let verifier = stored.pkce_verifier.expect("verifier kept server side");
    assert!(!url.contains(&verifier));
    assert_eq!(
        query_param(url, "code_challenge"),
        pc_identity::flow::code_challenge(PkceMethod::S256, &verifier)
    );
}

#[tokio::test]
async fn test_begin_login_without_pkce() {
    let h = harness().await;
    h.clients
        .register(
            RegisteredClient::new(TENANT, PROVIDER, "c2", REDIRECT_URI)
                .with_secret("other-secret")
                .with_pkce_method(PkceMethod::None),
        )
        .await
        .unwrap();

    let redirect = h
        .flow
        .begin_login(LoginRequest::new(TENANT, PROVIDER).with_client("c2"))
        .await
        .unwrap();

    assert!(query_param(&redirect.authorize_url, "code_challenge").is_none());
    assert!(query_param(&redirect.authorize_url, "code_challenge_method").is_none());
    assert!(h.states.peek(&redirect.state).unwrap().pkce_verifier.is_none());
}

#[tokio::test]
async fn test_begin_login_rejects_disallowed_scope() {
    let h = harness().await;

    let err = h
        .flow
        .begin_login(LoginRequest::new(TENANT, PROVIDER).with_scope("read:user repo"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidArgument { .. }));
    assert!(h.states.is_empty());
}

#[tokio::test]
async fn test_begin_login_unknown_provider_or_client() {
    let h = harness().await;

    let err = h
        .flow
        .begin_login(LoginRequest::new(TENANT, "nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound { .. }));

    let err = h
        .flow
        .begin_login(LoginRequest::new(TENANT, PROVIDER).with_client("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound { .. }));

    // Clients are tenant scoped
    let err = h
        .flow
        .begin_login(LoginRequest::new("t2", PROVIDER))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound { .. }));
    assert!(h.states.is_empty());
}

// ============================================================================
// complete_login
// ============================================================================

#[tokio::test]
async fn test_complete_login_creates_identity_session_and_token() {
    let h = harness().await;
    let redirect = h
        .flow
        .begin_login(LoginRequest::new(TENANT, PROVIDER).with_return_url("/home"))
        .await
        .unwrap();
    let verifier = h.states.peek(&redirect.state).unwrap().pkce_verifier.unwrap();

    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .and(body_string_contains(format!("code_verifier={}", verifier)))
        .and(body_string_contains("client_secret=s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": ACCESS_TOKEN,
            "token_type": "bearer",
            "scope": "read:user",
            "refresh_token": "ghr_refresh",
            "expires_in": 28800
        })))
        .expect(1)
        .mount(&h.server)
        .await;
    h.mock_userinfo_ok().await;

    let outcome = h
        .flow
        .complete_login(
            CallbackRequest::new(TENANT, "the-code", &redirect.state)
                .with_expected_provider(PROVIDER)
                .with_context(SessionContext {
                    user_agent: Some("test-agent".to_string()),
                    ip_address: Some("10.0.0.1".to_string()),
                }),
        )
        .await
        .unwrap();

    assert_eq!(outcome.identity.provider_type, "OAUTH_GITHUB");
    assert_eq!(outcome.identity.provider_uid, "42");
    assert_eq!(outcome.session.user_id, outcome.identity.user_id);
    assert_eq!(outcome.session.identity_id, outcome.identity.id);
    assert_eq!(outcome.session.user_agent.as_deref(), Some("test-agent"));
    assert_eq!(outcome.return_url.as_deref(), Some("/home"));
    assert_eq!(outcome.client_id, CLIENT_ID);

    let user = h.ledger.get_user(TENANT, &outcome.identity.user_id).await.unwrap();
    assert_eq!(user.username.as_deref(), Some("octocat"));
    assert_eq!(user.email.as_deref(), Some("octocat@example.com"));

    let tokens = h.tokens.list_tokens(TENANT, &outcome.identity.user_id).await.unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].access_token, ACCESS_TOKEN);
    assert_eq!(tokens[0].refresh_token.as_deref(), Some("ghr_refresh"));
    assert_eq!(tokens[0].scope, "read:user");
    assert!(tokens[0].expires_at.is_some());

    assert_eq!(h.ledger.session_count(), 1);
    assert!(h.states.is_empty());
}

#[tokio::test]
async fn test_replayed_state_is_rejected() {
    let h = harness().await;
    h.mock_provider_ok().await;
    let redirect = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();

    h.flow
        .complete_login(CallbackRequest::new(TENANT, "code", &redirect.state))
        .await
        .unwrap();
    let err = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "code", &redirect.state))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidState { .. }));
    assert_eq!(h.ledger.session_count(), 1);
}

#[tokio::test]
async fn test_unknown_state_never_reaches_provider() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "code", "never-issued"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidState { .. }));
    assert_eq!(h.ledger.identity_count(), 0);
    assert_eq!(h.ledger.session_count(), 0);
}

#[tokio::test]
async fn test_missing_state_or_code() {
    let h = harness().await;

    let err = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "code", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState { .. }));

    let redirect = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();
    let err = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, " ", &redirect.state))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidArgument { .. }));
    // Rejected before consuming
    assert!(h.states.peek(&redirect.state).is_some());
}

#[tokio::test]
async fn test_expired_state_is_rejected() {
    let h = harness().await;
    let expired = NewAuthState::new(TENANT, PROVIDER, CLIENT_ID)
        .with_scope("read:user")
        .into_state("expired-state-token".to_string(), Duration::seconds(-5));
    h.states.insert_raw(expired);

    let err = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "code", "expired-state-token"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidState { .. }));
    assert!(h.states.is_empty());
}

#[tokio::test]
async fn test_tenant_and_provider_mismatch() {
    let h = harness().await;

    let redirect = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();
    let err = h
        .flow
        .complete_login(CallbackRequest::new("t2", "code", &redirect.state))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState { .. }));

    let redirect = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();
    let err = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "code", &redirect.state).with_expected_provider("google"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState { .. }));
    assert_eq!(h.ledger.identity_count(), 0);
}

#[tokio::test]
async fn test_token_exchange_failure() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "bad_verification_code"
        })))
        .mount(&h.server)
        .await;
    let redirect = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();

    let err = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "bad", &redirect.state))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::TokenExchangeFailed { .. }));
    assert_eq!(h.ledger.session_count(), 0);
    assert!(h.tokens.is_empty());
    // A failed exchange still burns the state
    assert!(h.states.is_empty());
}

#[tokio::test]
async fn test_error_body_with_ok_status_is_exchange_failure() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "incorrect_client_credentials",
            "error_description": "The client_id and/or client_secret passed are incorrect."
        })))
        .mount(&h.server)
        .await;
    let redirect = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();

    let err = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "code", &redirect.state))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::TokenExchangeFailed { .. }));
}

#[tokio::test]
async fn test_userinfo_failure() {
    let h = harness().await;
    h.mock_token_ok().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;
    let redirect = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();

    let err = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "code", &redirect.state))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::UserInfoFailed { .. }));
    assert_eq!(h.ledger.identity_count(), 0);
    assert!(h.tokens.is_empty());
}

#[tokio::test]
async fn test_repeat_login_reuses_identity() {
    let h = harness().await;
    h.mock_provider_ok().await;

    let first = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();
    let first = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "code-1", &first.state))
        .await
        .unwrap();
    let second = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();
    let second = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "code-2", &second.state))
        .await
        .unwrap();

    assert_eq!(first.identity.id, second.identity.id);
    assert_eq!(first.identity.user_id, second.identity.user_id);
    assert_ne!(first.session.id, second.session.id);
    assert_ne!(first.session.auth_token, second.session.auth_token);
    assert_eq!(h.ledger.identity_count(), 1);
    assert_eq!(h.ledger.user_count(), 1);
    assert_eq!(h.ledger.session_count(), 2);
    assert_eq!(h.tokens.len(), 2);
    assert!(second.identity.last_signin_at.is_some());
}

#[tokio::test]
async fn test_inactive_user_is_refused() {
    let h = harness().await;
    h.mock_provider_ok().await;

    let redirect = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();
    let outcome = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "code", &redirect.state))
        .await
        .unwrap();
    h.ledger
        .patch_user(
            TENANT,
            &outcome.identity.user_id,
            UserPatch {
                status: Some(UserStatus::Inactive),
                ..UserPatch::default()
            },
        )
        .await
        .unwrap();

    let redirect = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();
    let err = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "code", &redirect.state))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::LoginFailed { .. }));
    assert_eq!(h.ledger.session_count(), 1);
}

#[tokio::test]
async fn test_token_save_failure_withdraws_session() {
    let h = harness_with_tokens(Some(Arc::new(FailingTokenStore))).await;
    h.mock_provider_ok().await;
    let redirect = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();

    let err = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "code", &redirect.state))
        .await
        .unwrap_err();

    match err {
        AuthError::LoginFailed { message } => assert!(!message.contains("unavailable")),
        other => panic!("expected LoginFailed, got {:?}", other),
    }
    assert_eq!(h.ledger.session_count(), 0);
}

#[tokio::test]
async fn test_crashed_login_task_withdraws_session() {
    let h = harness_with_tokens(Some(Arc::new(PanickingTokenStore))).await;
    h.mock_provider_ok().await;
    let redirect = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();

    let err = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "code", &redirect.state))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::LoginFailed { .. }), "{:?}", err);
    assert_eq!(h.ledger.session_count(), 0);
}

#[tokio::test]
async fn test_huge_expires_in_is_stored_without_expiry() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": ACCESS_TOKEN,
            "token_type": "bearer",
            "expires_in": 9_000_000_000_000_000u64
        })))
        .mount(&h.server)
        .await;
    h.mock_userinfo_ok().await;
    let redirect = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();

    let outcome = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "code", &redirect.state))
        .await
        .unwrap();

    assert_eq!(h.ledger.session_count(), 1);
    assert_eq!(h.tokens.len(), 1);
    let token = h
        .tokens
        .latest_token(TENANT, &outcome.identity.user_id, PROVIDER, CLIENT_ID)
        .await
        .unwrap()
        .unwrap();
    assert!(token.expires_at.is_none());
}

#[tokio::test]
async fn test_client_removed_mid_flow() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;
    let redirect = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();

    assert!(h.clients.remove(TENANT, PROVIDER, CLIENT_ID).await.unwrap());
    let err = h
        .flow
        .complete_login(CallbackRequest::new(TENANT, "code", &redirect.state))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidState { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callbacks_have_one_winner() {
    let h = harness().await;
    h.mock_provider_ok().await;
    let redirect = h.flow.begin_login(LoginRequest::new(TENANT, PROVIDER)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let flow = h.flow.clone();
        let state = redirect.state.clone();
        handles.push(tokio::spawn(async move {
            flow.complete_login(CallbackRequest::new(TENANT, "code", state)).await
        }));
    }

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => assert!(matches!(e, AuthError::InvalidState { .. })),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(h.ledger.session_count(), 1);
    assert_eq!(h.tokens.len(), 1);
}
