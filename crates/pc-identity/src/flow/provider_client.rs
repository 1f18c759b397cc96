//! Provider HTTP calls: code-for-token exchange and user info.
//!
//! Neither call is retried. Authorization codes are single-use, so a second
//! exchange attempt would be rejected by the provider anyway.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::client::RegisteredClient;
use crate::provider::Provider;
use crate::shared::error::{AuthError, Result};
use crate::shared::props::{props_from_json, Props};

const USER_AGENT: &str = concat!("portcullis/", env!("CARGO_PKG_VERSION"));

/// Longest `expires_in` taken at face value (ten years).
const MAX_EXPIRES_IN_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Successful token endpoint response.
#[derive(Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    /// Scope as granted, when the provider reports it
    pub scope: Option<String>,
}

/// Normalized user-info document.
#[derive(Debug, Clone)]
pub struct UserInfo {
    /// Stable account id at the provider
    pub subject: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub nickname: Option<String>,
    /// Full response, for identity props
    pub props: Props,
}

#[derive(Clone)]
pub struct ProviderHttpClient {
    http_client: reqwest::Client,
}

impl ProviderHttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AuthError::internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    /// POST the authorization code to the provider's token endpoint.
    pub async fn exchange_code(
        &self,
        provider: &Provider,
        client: &RegisteredClient,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", client.redirect_uri.as_str()),
            ("client_id", client.client_id.as_str()),
        ];
        if let Some(secret) = client.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }

        let response = self
            .http_client
            .post(&provider.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::token_exchange_failed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(provider = %provider.id, %status, "Token endpoint rejected the code");
            return Err(AuthError::token_exchange_failed(format!(
                "token endpoint returned {}: {}",
                status,
                truncate(&body)
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| AuthError::token_exchange_failed(format!("malformed token response: {}", e)))?;
        parse_token_response(&json)
    }

    /// GET the user-info document with the access token as bearer.
    pub async fn fetch_userinfo(&self, provider: &Provider, access_token: &str) -> Result<UserInfo> {
        let response = self
            .http_client
            .get(&provider.userinfo_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::userinfo_failed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(provider = %provider.id, %status, "User info request rejected");
            return Err(AuthError::userinfo_failed(format!("userinfo endpoint returned {}", status)));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| AuthError::userinfo_failed(format!("malformed userinfo response: {}", e)))?;
        let info = parse_userinfo(&json)?;
        debug!(provider = %provider.id, "Fetched user info");
        Ok(info)
    }
}

/// Some providers answer 200 with an `error` body, treat that as a failure too.
fn parse_token_response(json: &Value) -> Result<TokenResponse> {
    if let Some(error) = json.get("error").and_then(Value::as_str) {
        let description = json
            .get("error_description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(AuthError::token_exchange_failed(format!("{} {}", error, description).trim().to_string()));
    }

    let access_token = json
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::token_exchange_failed("no access_token in response"))?;

    let expires_in = json.get("expires_in").and_then(|v| {
        v.as_i64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    });
    // Out-of-range lifetimes are dropped and the token is stored without an expiry
    let expires_in = match expires_in {
        Some(secs) if !(1..=MAX_EXPIRES_IN_SECS).contains(&secs) => {
            warn!(expires_in = secs, "Ignoring out-of-range expires_in from token endpoint");
            None
        }
        other => other,
    };

    Ok(TokenResponse {
        access_token: access_token.to_string(),
        token_type: string_field(json, "token_type"),
        refresh_token: string_field(json, "refresh_token"),
        expires_in,
        // GitHub separates granted scopes with commas
        scope: string_field(json, "scope").map(|s| s.replace(',', " ")),
    })
}

fn parse_userinfo(json: &Value) -> Result<UserInfo> {
    if !json.is_object() {
        return Err(AuthError::userinfo_failed("userinfo response is not an object"));
    }

    let subject = ["sub", "id"]
        .iter()
        .find_map(|key| match json.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| AuthError::userinfo_failed("userinfo response has no subject"))?;

    let first_of = |keys: &[&str]| keys.iter().find_map(|key| string_field(json, key));

    Ok(UserInfo {
        subject,
        email: string_field(json, "email"),
        username: first_of(&["preferred_username", "login", "username", "email"]),
        nickname: first_of(&["name", "nickname"]),
        props: props_from_json(json),
    })
}

fn string_field(json: &Value, key: &str) -> Option<String> {
    json.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_token_response() {
        let token = parse_token_response(&json!({
            "access_token": "gho_abc",
            "token_type": "bearer",
            "scope": "read:user,user:email",
            "expires_in": "3600"
        }))
        .unwrap();

        assert_eq!(token.access_token, "gho_abc");
        assert_eq!(token.scope.as_deref(), Some("read:user user:email"));
        assert_eq!(token.expires_in, Some(3600));
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn test_out_of_range_expires_in_is_dropped() {
        for expires_in in [json!(9_000_000_000_000_000u64), json!(-5), json!(0), json!("99999999999999")] {
            let token = parse_token_response(&json!({
                "access_token": "gho_abc",
                "expires_in": expires_in
            }))
            .unwrap();
            assert_eq!(token.access_token, "gho_abc");
            assert!(token.expires_in.is_none(), "{}", expires_in);
        }

        let token = parse_token_response(&json!({ "access_token": "gho_abc", "expires_in": 28800 })).unwrap();
        assert_eq!(token.expires_in, Some(28800));
    }

    #[test]
    fn test_error_body_is_failure() {
        let err = parse_token_response(&json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired."
        }))
        .unwrap_err();
        assert!(matches!(err, AuthError::TokenExchangeFailed { .. }));
    }

    #[test]
    fn test_missing_access_token_is_failure() {
        let err = parse_token_response(&json!({ "token_type": "bearer" })).unwrap_err();
        assert!(matches!(err, AuthError::TokenExchangeFailed { .. }));
    }

    #[test]
    fn test_parse_github_userinfo() {
        let info = parse_userinfo(&json!({
            "id": 583231,
            "login": "octocat",
            "name": "The Octocat",
            "email": null
        }))
        .unwrap();

        assert_eq!(info.subject, "583231");
        assert_eq!(info.username.as_deref(), Some("octocat"));
        assert_eq!(info.nickname.as_deref(), Some("The Octocat"));
        assert!(info.email.is_none());
        assert!(!info.props.contains_key("email"));
    }

    #[test]
    fn test_parse_oidc_userinfo() {
        let info = parse_userinfo(&json!({
            "sub": "1108",
            "email": "a@example.com",
            "preferred_username": "alice"
        }))
        .unwrap();

        assert_eq!(info.subject, "1108");
        assert_eq!(info.username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_userinfo_without_subject() {
        let err = parse_userinfo(&json!({ "login": "octocat" })).unwrap_err();
        assert!(matches!(err, AuthError::UserInfoFailed { .. }));
    }
}
