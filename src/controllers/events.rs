use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::error::DomainError;
use crate::middleware::Identity;
use crate::store::{EventFilter, EventPatch, NewEvent};
use crate::AppState;

use super::{ListResponse, PageQuery};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/{id}",
            get(get_event).put(update_event).delete(delete_event),
        )
}

/* ---------- requests ---------- */

#[derive(Debug, Deserialize)]
struct EventsQuery {
    available: Option<bool>,
    query: Option<String>,
    page: Option<u32>,
    #[serde(rename = "pageSize")]
    page_size: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
struct CreateEventRequest {
    #[validate(length(min = 1, max = 255))]
    title: String,
    #[validate(length(max = 1000))]
    description: Option<String>,
    #[validate(length(max = 255))]
    venue: Option<String>,
    date: DateTime<Utc>,
    #[validate(range(min = 0))]
    total_seats: i32,
    #[validate(range(min = 0.0))]
    price: f64,
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateEventRequest {
    #[validate(length(min = 1, max = 255))]
    title: Option<String>,
    #[validate(length(max = 1000))]
    description: Option<String>,
    #[validate(length(max = 255))]
    venue: Option<String>,
    date: Option<DateTime<Utc>>,
    #[validate(range(min = 0))]
    total_seats: Option<i32>,
    #[validate(range(min = 0.0))]
    price: Option<f64>,
}

fn invalid(e: validator::ValidationErrors) -> DomainError {
    DomainError::InvalidInput(e.to_string())
}

/* ---------- handlers ---------- */

// GET /api/events
async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> Result<impl IntoResponse, DomainError> {
    let filter = EventFilter {
        available_only: params.available.unwrap_or(false),
        query: params.query,
    };
    let page = PageQuery {
        page: params.page,
        page_size: params.page_size,
    }
    .page();
    let (items, total) = state.events.list(filter, page).await?;
    Ok(Json(ListResponse {
        items,
        total,
        page: page.page,
        page_size: page.page_size,
    }))
}

// GET /api/events/{id}
async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, DomainError> {
    Ok(Json(state.events.get(id).await?))
}

// POST /api/events (admin)
async fn create_event(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, DomainError> {
    req.validate().map_err(invalid)?;
    let event = state
        .events
        .create(
            &identity,
            NewEvent {
                title: req.title,
                description: req.description,
                venue: req.venue,
                date: req.date,
                total_seats: req.total_seats,
                price: req.price,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

// PUT /api/events/{id} (admin)
async fn update_event(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
    Json(req): Json<UpdateEventRequest>,
) -> Result<impl IntoResponse, DomainError> {
    req.validate().map_err(invalid)?;
    let patch = EventPatch {
        title: req.title,
        description: req.description,
        venue: req.venue,
        date: req.date,
        price: req.price,
    };
    let event = state
        .events
        .update(&identity, id, req.total_seats, patch)
        .await?;
    Ok(Json(event))
}

// DELETE /api/events/{id} (admin, destructive: bookings cascade)
async fn delete_event(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, DomainError> {
    state.events.delete(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
