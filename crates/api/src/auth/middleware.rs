//! Authentication middleware for Axum
//!
//! Two gates, applied in order:
//! 1. [`require_auth`] validates the bearer token and attaches [`AuthUser`].
//! 2. [`require_admin`] reads the attached [`AuthUser`] and demands `Admin`.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use super::jwt::{Claims, JwtManager, TokenError};
use crate::identity::Role;

/// Authenticated caller, available to handlers via `Extension<AuthUser>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            role: claims.role,
        }
    }
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
}

/// Extract bearer token from the Authorization header
fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| {
            header
                .strip_prefix("Bearer ")
                .or_else(|| header.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware that requires a valid bearer token
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(token) = extract_bearer_token(&request) else {
        tracing::debug!(path = %path, "require_auth: no bearer token");
        return AuthError::MissingAuth.into_response();
    };

    match auth_state.jwt_manager.validate_token(token) {
        Ok(claims) => {
            let auth_user = AuthUser::from(claims);
            tracing::debug!(
                path = %path,
                user_id = %auth_user.user_id,
                role = %auth_user.role,
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::info!(path = %path, error = %err, "require_auth: token rejected");
            AuthError::from(err).into_response()
        }
    }
}

/// Middleware that requires the caller to be an admin.
/// Must run after [`require_auth`].
pub async fn require_admin(request: Request, next: Next) -> Response {
    let Some(auth_user) = request.extensions().get::<AuthUser>() else {
        return AuthError::MissingAuth.into_response();
    };

    if !auth_user.is_admin() {
        tracing::info!(
            path = %request.uri().path(),
            user_id = %auth_user.user_id,
            "require_admin: insufficient role"
        );
        return AuthError::InsufficientPermissions.into_response();
    }

    next.run(request).await
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Expired token")]
    ExpiredToken,
    #[error("Malformed token")]
    MalformedToken,
    #[error("Insufficient permissions")]
    InsufficientPermissions,
    #[error("Internal error")]
    Internal,
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidToken => AuthError::InvalidToken,
            TokenError::ExpiredToken => AuthError::ExpiredToken,
            TokenError::MalformedToken => AuthError::MalformedToken,
            TokenError::Signing(_) => AuthError::Internal,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthError::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "No token, authorization denied",
            ),
            AuthError::InvalidToken | AuthError::MalformedToken => {
                (StatusCode::UNAUTHORIZED, "unauthenticated", "Token is not valid")
            }
            AuthError::ExpiredToken => (StatusCode::UNAUTHORIZED, "unauthenticated", "Token has expired"),
            AuthError::InsufficientPermissions => {
                (StatusCode::FORBIDDEN, "forbidden", "Admin access required")
            }
            AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
        };

        let body = Json(json!({
            "error": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}
