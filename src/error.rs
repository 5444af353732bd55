use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::models::BookingStatus;

/// Domain error taxonomy. Every variant is recoverable at the HTTP boundary;
/// `InternalConsistency` and `Database` additionally log, since they point at
/// a bug or an infrastructure failure rather than a bad request.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("insufficient seats: requested {requested}, available {available}")]
    InsufficientSeats { requested: i32, available: i32 },
    #[error("booking is {0} and cannot change state")]
    InvalidStateTransition(BookingStatus),
    #[error("cannot shrink capacity: {committed} seats already committed")]
    CapacityConflict { committed: i32 },
    #[error("not allowed to act on this resource")]
    Unauthorized,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("the operation hit contention, retry it")]
    TransientConflict,
    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),
}

impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        let status = match &self {
            DomainError::Database(e) => {
                error!("database error: {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DomainError::InsufficientSeats { .. } => StatusCode::CONFLICT,
            DomainError::InvalidStateTransition(_) => StatusCode::CONFLICT,
            DomainError::CapacityConflict { .. } => StatusCode::CONFLICT,
            DomainError::Unauthorized => StatusCode::FORBIDDEN,
            DomainError::Conflict(_) => StatusCode::CONFLICT,
            DomainError::TransientConflict => StatusCode::SERVICE_UNAVAILABLE,
            DomainError::InternalConsistency(msg) => {
                error!("internal consistency violation: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self {
            // Do not leak driver details to clients.
            DomainError::Database(_) => "internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
