//! Identity Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use mongodb::error::{ErrorKind, WriteFailure};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Login state expired")]
    Expired,

    #[error("Invalid login state: {message}")]
    InvalidState { message: String },

    #[error("Token exchange failed: {message}")]
    TokenExchangeFailed { message: String },

    #[error("User info request failed: {message}")]
    UserInfoFailed { message: String },

    #[error("Login failed: {message}")]
    LoginFailed { message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Duplicate {entity_type}: {key}")]
    Duplicate { entity_type: String, key: String },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bson::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] bson::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AuthError {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }

    pub fn token_exchange_failed(message: impl Into<String>) -> Self {
        Self::TokenExchangeFailed { message: message.into() }
    }

    pub fn userinfo_failed(message: impl Into<String>) -> Self {
        Self::UserInfoFailed { message: message.into() }
    }

    pub fn login_failed(message: impl Into<String>) -> Self {
        Self::LoginFailed { message: message.into() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn duplicate(entity_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type: entity_type.into(),
            key: key.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout { operation: operation.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Stable code used in API responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::NotFound { .. } => "NOT_FOUND",
            AuthError::Expired => "EXPIRED",
            AuthError::InvalidState { .. } => "INVALID_STATE",
            AuthError::TokenExchangeFailed { .. } => "TOKEN_EXCHANGE_FAILED",
            AuthError::UserInfoFailed { .. } => "USER_INFO_FAILED",
            AuthError::LoginFailed { .. } => "LOGIN_FAILED",
            AuthError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            AuthError::Duplicate { .. } => "DUPLICATE",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::Timeout { .. } => "TIMEOUT",
            _ => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

/// True when a MongoDB write failed on a unique index.
pub(crate) fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}

/// Error response body
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::NotFound { .. } => StatusCode::NOT_FOUND,
            AuthError::Expired
            | AuthError::InvalidState { .. }
            | AuthError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            AuthError::TokenExchangeFailed { .. } | AuthError::UserInfoFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
            AuthError::Duplicate { .. } => StatusCode::CONFLICT,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Internal identifiers and provider responses stay in the logs.
        let message = match &self {
            AuthError::LoginFailed { .. } => "Login could not be completed, please start again".to_string(),
            AuthError::TokenExchangeFailed { .. } => "The identity provider rejected the authorization code".to_string(),
            AuthError::UserInfoFailed { .. } => "The identity provider did not return the user profile".to_string(),
            AuthError::InvalidState { .. } | AuthError::Expired => {
                "Invalid or expired login session, please start again".to_string()
            }
            e if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %e, "Request failed with internal error");
                "Internal error".to_string()
            }
            e => e.to_string(),
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(AuthError::not_found("Provider", "github").code(), "NOT_FOUND");
        assert_eq!(AuthError::Expired.code(), "EXPIRED");
        assert_eq!(AuthError::invalid_state("replay").code(), "INVALID_STATE");
        assert_eq!(AuthError::internal("boom").code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AuthError::not_found("Client", "c1"), StatusCode::NOT_FOUND),
            (AuthError::invalid_state("x"), StatusCode::BAD_REQUEST),
            (AuthError::token_exchange_failed("400"), StatusCode::BAD_GATEWAY),
            (AuthError::login_failed("session insert"), StatusCode::INTERNAL_SERVER_ERROR),
            (AuthError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AuthError::duplicate("Identity", "EMAIL/a@b.c"), StatusCode::CONFLICT),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
