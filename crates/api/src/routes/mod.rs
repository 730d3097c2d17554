//! API routes

pub mod auth;
pub mod sweets;

use axum::{
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};

use crate::{
    auth::{require_admin, require_auth},
    state::AppState,
};

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/send-otp", post(auth::send_otp))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/google", post(auth::google_login));

    // Any authenticated caller
    let member_routes = Router::new()
        .route("/sweets", get(sweets::list_sweets))
        .route("/sweets/search", get(sweets::search_sweets))
        .route("/sweets/{id}/purchase", post(sweets::purchase_sweet))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_auth,
        ));

    // require_auth is added last so it runs first and attaches AuthUser
    let admin_routes = Router::new()
        .route("/sweets", post(sweets::create_sweet))
        .route(
            "/sweets/{id}",
            put(sweets::update_sweet).delete(sweets::delete_sweet),
        )
        .route("/sweets/{id}/restock", post(sweets::restock_sweet))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth));

    Router::new()
        .merge(public_routes)
        .merge(member_routes)
        .merge(admin_routes)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
