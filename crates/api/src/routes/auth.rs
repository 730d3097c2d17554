//! Authentication routes

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{find_or_create_identity, RegistrationRequest},
    error::ApiResult,
    identity::IdentitySummary,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct GoogleLoginRequest {
    /// Google ID token from the sign-in popup
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub token: String,
    pub user: IdentitySummary,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: IdentitySummary,
}

/// POST /auth/send-otp
pub async fn send_otp(
    State(state): State<AppState>,
    Json(req): Json<SendOtpRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state.registration.request_challenge(&req.email).await?;
    Ok(Json(MessageResponse {
        message: "OTP sent to email",
    }))
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let identity = state
        .registration
        .complete_registration(RegistrationRequest {
            name: req.name,
            email: req.email,
            password: req.password,
            otp: req.otp,
        })
        .await?;

    tracing::info!(user_id = %identity.id, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User registered successfully",
        }),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let outcome = state.authenticator.login(&req.email, &req.password).await?;
    Ok(Json(LoginResponse {
        message: "Login successful",
        token: outcome.token,
        user: IdentitySummary::from(&outcome.identity),
    }))
}

/// POST /auth/google
pub async fn google_login(
    State(state): State<AppState>,
    Json(req): Json<GoogleLoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let profile = state.federated.verify(req.token.trim()).await.map_err(|e| {
        tracing::info!(error = %e, "Federated assertion rejected");
        e
    })?;

    let identity = find_or_create_identity(state.identities.as_ref(), &profile).await?;
    let token = state.jwt_manager.generate_token(&identity)?;

    tracing::info!(user_id = %identity.id, "Federated login successful");
    Ok(Json(TokenResponse {
        token,
        user: IdentitySummary::from(&identity),
    }))
}
