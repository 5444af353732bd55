use std::sync::Arc;

use tracing::{info, warn};

use crate::error::DomainError;
use crate::middleware::Identity;
use crate::models::Event;
use crate::store::{EventFilter, EventPatch, EventStore, NewEvent, Page, SeatAllocator};

/// Admin-facing event management. Seat counters are never touched here
/// directly: capacity edits are routed through the allocator's
/// `reconcile_capacity` so `available_seats` cannot drift.
#[derive(Clone)]
pub struct EventService {
    events: Arc<dyn EventStore>,
    allocator: Arc<dyn SeatAllocator>,
}

impl EventService {
    pub fn new(events: Arc<dyn EventStore>, allocator: Arc<dyn SeatAllocator>) -> Self {
        EventService { events, allocator }
    }

    pub async fn create(&self, acting: &Identity, new: NewEvent) -> Result<Event, DomainError> {
        acting.require_admin()?;
        if new.total_seats < 0 {
            return Err(DomainError::InvalidInput(
                "total_seats must not be negative".to_string(),
            ));
        }
        if new.price < 0.0 {
            return Err(DomainError::InvalidInput(
                "price must not be negative".to_string(),
            ));
        }
        if self.events.find_by_title(&new.title).await?.is_some() {
            return Err(DomainError::Conflict(
                "an event with this title already exists".to_string(),
            ));
        }
        let event = self.events.create(new).await?;
        info!(
            "event {} created with {} seats by {}",
            event.id, event.total_seats, acting.user_id
        );
        Ok(event)
    }

    pub async fn get(&self, id: i64) -> Result<Event, DomainError> {
        self.events
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("event {id}")))
    }

    pub async fn list(
        &self,
        filter: EventFilter,
        page: Page,
    ) -> Result<(Vec<Event>, i64), DomainError> {
        let items = self.events.list(&filter, page).await?;
        let total = self.events.count(&filter).await?;
        Ok((items, total))
    }

    /// Partial update. A `total_seats` change goes through the allocator
    /// first, so a shrink below the committed seats fails before any other
    /// field is touched.
    pub async fn update(
        &self,
        acting: &Identity,
        id: i64,
        new_total_seats: Option<i32>,
        patch: EventPatch,
    ) -> Result<Event, DomainError> {
        acting.require_admin()?;
        if let Some(price) = patch.price {
            if price < 0.0 {
                return Err(DomainError::InvalidInput(
                    "price must not be negative".to_string(),
                ));
            }
        }

        let mut event = self.get(id).await?;
        if let Some(new_total) = new_total_seats {
            if new_total != event.total_seats {
                event = self.allocator.reconcile_capacity(id, new_total).await?;
                info!(
                    "event {} capacity reconciled to {} by {}",
                    id, new_total, acting.user_id
                );
            }
        }
        if patch.is_empty() {
            return Ok(event);
        }
        self.events.update(id, patch).await
    }

    /// Destructive and irreversible: the event's bookings are removed with
    /// it, audit history included.
    pub async fn delete(&self, acting: &Identity, id: i64) -> Result<(), DomainError> {
        acting.require_admin()?;
        // Surface NotFound before the destructive write.
        let event = self.get(id).await?;
        warn!(
            "admin {} is deleting event {} ({} seats committed)",
            acting.user_id,
            id,
            event.committed_seats()
        );
        self.events.delete(id).await
    }
}
