//! Inventory routes
//!
//! Reads and purchases need any authenticated caller; everything that
//! changes the catalogue or adds stock is admin-only. The gates are attached
//! in [`super::create_router`].

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
    sweets::{NewSweet, Sweet, SweetFilter, SweetUpdate},
};

/// Largest amount accepted by a single restock
pub const MAX_RESTOCK_AMOUNT: i32 = 10_000;

#[derive(Debug, Default, Deserialize)]
pub struct RestockRequest {
    pub amount: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
}

fn validate_new(sweet: &NewSweet) -> ApiResult<()> {
    if sweet.name.trim().is_empty() || sweet.category.trim().is_empty() {
        return Err(ApiError::Validation("All fields required".into()));
    }
    if !sweet.price.is_finite() || sweet.price < 0.0 || sweet.quantity < 0 {
        return Err(ApiError::Validation(
            "Price and quantity must not be negative".into(),
        ));
    }
    Ok(())
}

/// GET /sweets
pub async fn list_sweets(State(state): State<AppState>) -> ApiResult<Json<Vec<Sweet>>> {
    Ok(Json(state.sweets.list().await?))
}

/// GET /sweets/search
pub async fn search_sweets(
    State(state): State<AppState>,
    Query(filter): Query<SweetFilter>,
) -> ApiResult<Json<Vec<Sweet>>> {
    Ok(Json(state.sweets.search(&filter).await?))
}

/// POST /sweets
pub async fn create_sweet(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<NewSweet>,
) -> ApiResult<(StatusCode, Json<Sweet>)> {
    validate_new(&req)?;
    let sweet = state.sweets.create(req).await?;
    tracing::info!(sweet_id = %sweet.id, admin_id = %auth_user.user_id, "Sweet created");
    Ok((StatusCode::CREATED, Json(sweet)))
}

/// PUT /sweets/{id}
pub async fn update_sweet(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SweetUpdate>,
) -> ApiResult<Json<Sweet>> {
    if req.price.is_some_and(|p| !p.is_finite() || p < 0.0) || req.quantity.is_some_and(|q| q < 0)
    {
        return Err(ApiError::Validation(
            "Price and quantity must not be negative".into(),
        ));
    }
    Ok(Json(state.sweets.update(id, req).await?))
}

/// DELETE /sweets/{id}
pub async fn delete_sweet(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteResponse>> {
    state.sweets.delete(id).await?;
    tracing::info!(sweet_id = %id, admin_id = %auth_user.user_id, "Sweet deleted");
    Ok(Json(DeleteResponse {
        message: "Sweet deleted",
    }))
}

/// POST /sweets/{id}/purchase
pub async fn purchase_sweet(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Sweet>> {
    let sweet = state.sweets.purchase(id).await?;
    tracing::debug!(sweet_id = %id, user_id = %auth_user.user_id, "Sweet purchased");
    Ok(Json(sweet))
}

/// POST /sweets/{id}/restock
pub async fn restock_sweet(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Json<Sweet>> {
    let request: RestockRequest = if body.is_empty() {
        RestockRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Validation(format!("Invalid restock body: {}", e)))?
    };
    let amount = request.amount.unwrap_or(1);
    if !(1..=MAX_RESTOCK_AMOUNT).contains(&amount) {
        return Err(ApiError::Validation(format!(
            "Restock amount must be between 1 and {}",
            MAX_RESTOCK_AMOUNT
        )));
    }
    Ok(Json(state.sweets.restock(id, amount).await?))
}
