use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::error::DomainError;
use crate::middleware::Identity;
use crate::AppState;

use super::PageQuery;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", get(list_my_bookings).post(create_booking))
        .route("/bookings/{id}", get(get_booking).delete(cancel_booking))
        .route("/events/{id}/bookings", get(list_event_bookings))
        .route("/admin/bookings", get(list_all_bookings))
        .route("/admin/bookings/{id}/expire", post(expire_booking))
}

/* ---------- requests ---------- */

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, Validate)]
struct CreateBookingRequest {
    event_id: i64,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1))]
    quantity: i32,
}

/* ---------- handlers ---------- */

// POST /api/bookings
async fn create_booking(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, DomainError> {
    req.validate()
        .map_err(|e| DomainError::InvalidInput(e.to_string()))?;
    let booking = state
        .bookings
        .create_booking(&identity, req.event_id, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings, the caller's own bookings
async fn list_my_bookings(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(params): Query<PageQuery>,
) -> Result<impl IntoResponse, DomainError> {
    let bookings = state.bookings.list_own(&identity, params.page()).await?;
    Ok(Json(bookings))
}

// GET /api/bookings/{id}
async fn get_booking(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, DomainError> {
    Ok(Json(state.bookings.get_booking(&identity, id).await?))
}

// DELETE /api/bookings/{id}. Cancellation is a status change, not a removal.
async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, DomainError> {
    Ok(Json(state.bookings.cancel_booking(&identity, id).await?))
}

// GET /api/events/{id}/bookings (admin)
async fn list_event_bookings(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
    Query(params): Query<PageQuery>,
) -> Result<impl IntoResponse, DomainError> {
    let bookings = state
        .bookings
        .list_by_event(&identity, id, params.page())
        .await?;
    Ok(Json(bookings))
}

// GET /api/admin/bookings (admin)
async fn list_all_bookings(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(params): Query<PageQuery>,
) -> Result<impl IntoResponse, DomainError> {
    let bookings = state.bookings.list_all(&identity, params.page()).await?;
    Ok(Json(bookings))
}

// POST /api/admin/bookings/{id}/expire (admin)
async fn expire_booking(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, DomainError> {
    Ok(Json(state.bookings.expire_booking(&identity, id).await?))
}
