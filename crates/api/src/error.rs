//! HTTP-boundary error type

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::auth::{
    challenge::ChallengeError, federated::FederationError, jwt::TokenError,
    password::PasswordError,
};
use crate::email::MailError;
use crate::identity::IdentityError;
use crate::sweets::SweetError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("User already exists")]
    Conflict,
    /// Same message for unknown email and wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid or expired OTP")]
    InvalidOtp,
    #[error("Not found: {0}")]
    NotFound(&'static str),
    #[error("Out of stock")]
    OutOfStock,
    #[error("Federated login failed: {0}")]
    Federation(#[from] FederationError),
    #[error("OTP dispatch failed: {0}")]
    Dispatch(#[from] MailError),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::Conflict => (
                StatusCode::BAD_REQUEST,
                "conflict",
                "User already exists".into(),
            ),
            ApiError::InvalidCredentials => (
                StatusCode::BAD_REQUEST,
                "invalid_credentials",
                "Invalid credentials".into(),
            ),
            ApiError::InvalidOtp => (
                StatusCode::BAD_REQUEST,
                "invalid_or_expired_otp",
                "Invalid or expired OTP".into(),
            ),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, "not_found", format!("{} not found", what)),
            ApiError::OutOfStock => (StatusCode::BAD_REQUEST, "out_of_stock", "Out of stock".into()),
            ApiError::Federation(_) => (
                StatusCode::UNAUTHORIZED,
                "federation_error",
                "Google login failed".into(),
            ),
            ApiError::Dispatch(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "dispatch_error",
                "Failed to send OTP".into(),
            ),
            ApiError::Database(_) | ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error".into(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.status_and_message();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = Json(json!({
            "error": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::EmailTaken => ApiError::Conflict,
            IdentityError::InvalidRole(role) => ApiError::Internal(format!("stored role {}", role)),
            IdentityError::Database(e) => ApiError::Database(e.to_string()),
        }
    }
}

impl From<ChallengeError> for ApiError {
    fn from(err: ChallengeError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Handlers only sign tokens; rejected bearer tokens are answered by the
/// auth middleware before a handler runs.
impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<SweetError> for ApiError {
    fn from(err: SweetError) -> Self {
        match err {
            SweetError::NotFound => ApiError::NotFound("Sweet"),
            SweetError::OutOfStock => ApiError::OutOfStock,
            SweetError::Database(e) => ApiError::Database(e.to_string()),
        }
    }
}
