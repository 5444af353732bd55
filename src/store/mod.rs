pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DomainError;
use crate::models::{Booking, BookingStatus, Event};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Fields accepted when creating an event. `available_seats` is not part of
/// this: it always starts equal to `total_seats`.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub venue: Option<String>,
    pub date: DateTime<Utc>,
    pub total_seats: i32,
    pub price: f64,
}

/// Partial event update. `total_seats` is deliberately absent; capacity
/// changes go through `SeatAllocator::reconcile_capacity` so the seat
/// counters stay consistent.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub venue: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub price: Option<f64>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.venue.is_none()
            && self.date.is_none()
            && self.price.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only events with free seats and a date in the future.
    pub available_only: bool,
    /// Case-insensitive title search.
    pub query: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Page {
    pub const DEFAULT_SIZE: u32 = 20;
    pub const MAX_SIZE: u32 = 100;

    pub fn clamped(page: Option<u32>, page_size: Option<u32>) -> Self {
        Page {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(Self::DEFAULT_SIZE).clamp(1, Self::MAX_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.page_size as i64
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::clamped(None, None)
    }
}

/// Durable record of events and their seat counters. The store enforces
/// structural constraints only; seat-allocation correctness lives behind
/// [`SeatAllocator`].
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn create(&self, new: NewEvent) -> Result<Event, DomainError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Event>, DomainError>;
    async fn find_by_title(&self, title: &str) -> Result<Option<Event>, DomainError>;
    async fn list(&self, filter: &EventFilter, page: Page) -> Result<Vec<Event>, DomainError>;
    async fn count(&self, filter: &EventFilter) -> Result<i64, DomainError>;
    async fn update(&self, id: i64, patch: EventPatch) -> Result<Event, DomainError>;
    /// Deletes the event and cascade-deletes its bookings. Irreversible.
    async fn delete(&self, id: i64) -> Result<(), DomainError>;
}

/// Durable record of bookings. Append-mostly: rows are inserted and their
/// status moved through the transition table, never removed (except by the
/// event cascade-delete).
#[async_trait]
pub trait BookingLedger: Send + Sync {
    async fn create(
        &self,
        event_id: i64,
        user_id: &str,
        quantity: i32,
        status: BookingStatus,
    ) -> Result<Booking, DomainError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Booking>, DomainError>;
    async fn list_by_user(&self, user_id: &str, page: Page) -> Result<Vec<Booking>, DomainError>;
    async fn list_by_event(&self, event_id: i64, page: Page) -> Result<Vec<Booking>, DomainError>;
    async fn list_all(&self, page: Page) -> Result<Vec<Booking>, DomainError>;
    /// A non-terminal booking this user already holds for the event, if any.
    async fn find_active_for_user(
        &self,
        event_id: i64,
        user_id: &str,
    ) -> Result<Option<Booking>, DomainError>;
    /// Compare-and-set status update: succeeds only when the current status
    /// is in `from`, otherwise fails with `InvalidStateTransition`. Returns
    /// the updated booking and the status it left, so callers know whether
    /// seats were held. The CAS is what makes cancellation exactly-once.
    async fn transition(
        &self,
        id: i64,
        from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<(Booking, BookingStatus), DomainError>;
}

/// The concurrency-safe seat counter. Every write to `available_seats` in the
/// whole system goes through these three operations, each of which is atomic
/// and scoped to a single event row, so reservations against different
/// events never contend.
#[async_trait]
pub trait SeatAllocator: Send + Sync {
    /// Decrement `available_seats` by `quantity` iff enough seats remain.
    /// Under concurrent callers the cumulative successful quantity never
    /// exceeds `total_seats`.
    async fn reserve(&self, event_id: i64, quantity: i32) -> Result<(), DomainError>;
    /// Increment `available_seats` by `quantity`, clamped at `total_seats`.
    /// A clamp means some caller released seats it never held; the counter is
    /// repaired, the violation logged and surfaced.
    async fn release(&self, event_id: i64, quantity: i32) -> Result<(), DomainError>;
    /// Apply an admin capacity change, shifting `available_seats` by the same
    /// delta. Shrinking below the committed quantity fails with
    /// `CapacityConflict` and leaves both counters untouched.
    async fn reconcile_capacity(&self, event_id: i64, new_total: i32) -> Result<Event, DomainError>;
}

// ---------- seat counter arithmetic ----------
//
// Both store backends make their allocation decisions with these functions;
// the backend only contributes the locking.

/// New `available_seats` after reserving `quantity`, or the typed failure.
pub(crate) fn debit_seats(available: i32, quantity: i32) -> Result<i32, DomainError> {
    if quantity < 1 {
        return Err(DomainError::InvalidInput(
            "quantity must be at least 1".to_string(),
        ));
    }
    if available < quantity {
        return Err(DomainError::InsufficientSeats {
            requested: quantity,
            available,
        });
    }
    Ok(available - quantity)
}

/// New `available_seats` after releasing `quantity`, and whether the result
/// had to be clamped at `total`.
pub(crate) fn credit_seats(
    available: i32,
    total: i32,
    quantity: i32,
) -> Result<(i32, bool), DomainError> {
    if quantity < 1 {
        return Err(DomainError::InvalidInput(
            "quantity must be at least 1".to_string(),
        ));
    }
    let raw = available.saturating_add(quantity);
    if raw > total {
        Ok((total, true))
    } else {
        Ok((raw, false))
    }
}

/// New `available_seats` for a capacity change from `total` to `new_total`.
pub(crate) fn reconcile_seats(
    total: i32,
    available: i32,
    new_total: i32,
) -> Result<i32, DomainError> {
    if new_total < 0 {
        return Err(DomainError::InvalidInput(
            "total_seats must not be negative".to_string(),
        ));
    }
    let committed = total - available;
    if new_total < committed {
        return Err(DomainError::CapacityConflict { committed });
    }
    // Equivalent to available + (new_total - total), already clamped to
    // [0, new_total] by the committed check.
    Ok(new_total - committed)
}
