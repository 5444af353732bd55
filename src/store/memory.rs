use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, warn};

use crate::error::DomainError;
use crate::models::{Booking, BookingStatus, Event};

use super::{
    credit_seats, debit_seats, reconcile_seats, BookingLedger, EventFilter, EventPatch, EventStore,
    NewEvent, Page, SeatAllocator,
};

/// In-memory store, primarily for tests and local development without a
/// database. Each event sits behind its own `Mutex`, which is the in-process
/// equivalent of a row lock: reservations against different events never
/// contend, reservations against the same event serialize.
#[derive(Default)]
pub struct MemoryStore {
    events: RwLock<HashMap<i64, Arc<Mutex<Event>>>>,
    bookings: RwLock<HashMap<i64, Booking>>,
    event_seq: AtomicI64,
    booking_seq: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn event_cell(&self, id: i64) -> Result<Arc<Mutex<Event>>, DomainError> {
        self.events
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("event {id}")))
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn create(&self, new: NewEvent) -> Result<Event, DomainError> {
        let now = Utc::now();
        let id = self.event_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let event = Event {
            id,
            title: new.title,
            description: new.description,
            venue: new.venue,
            date: new.date,
            total_seats: new.total_seats,
            available_seats: new.total_seats,
            price: new.price,
            created_at: now,
            updated_at: now,
        };
        self.events
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(event.clone())));
        Ok(event)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Event>, DomainError> {
        let cell = match self.events.read().await.get(&id).cloned() {
            Some(cell) => cell,
            None => return Ok(None),
        };
        let event = cell.lock().await.clone();
        Ok(Some(event))
    }

    async fn find_by_title(&self, title: &str) -> Result<Option<Event>, DomainError> {
        let cells: Vec<_> = self.events.read().await.values().cloned().collect();
        for cell in cells {
            let event = cell.lock().await;
            if event.title == title {
                return Ok(Some(event.clone()));
            }
        }
        Ok(None)
    }

    async fn list(&self, filter: &EventFilter, page: Page) -> Result<Vec<Event>, DomainError> {
        let mut events = snapshot(self, filter).await;
        events.sort_by_key(|e| e.date);
        Ok(events
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn count(&self, filter: &EventFilter) -> Result<i64, DomainError> {
        Ok(snapshot(self, filter).await.len() as i64)
    }

    async fn update(&self, id: i64, patch: EventPatch) -> Result<Event, DomainError> {
        let cell = self.event_cell(id).await?;
        let mut event = cell.lock().await;
        if let Some(title) = patch.title {
            event.title = title;
        }
        if let Some(description) = patch.description {
            event.description = Some(description);
        }
        if let Some(venue) = patch.venue {
            event.venue = Some(venue);
        }
        if let Some(date) = patch.date {
            event.date = date;
        }
        if let Some(price) = patch.price {
            event.price = price;
        }
        event.updated_at = Utc::now();
        Ok(event.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), DomainError> {
        if self.events.write().await.remove(&id).is_none() {
            return Err(DomainError::NotFound(format!("event {id}")));
        }
        // Cascade: the event's bookings go with it.
        self.bookings
            .write()
            .await
            .retain(|_, booking| booking.event_id != id);
        warn!("event {} deleted, its bookings are gone with it", id);
        Ok(())
    }
}

async fn snapshot(store: &MemoryStore, filter: &EventFilter) -> Vec<Event> {
    let cells: Vec<_> = store.events.read().await.values().cloned().collect();
    let now = Utc::now();
    let mut out = Vec::with_capacity(cells.len());
    for cell in cells {
        let event = cell.lock().await.clone();
        if filter.available_only && !(event.available_seats > 0 && event.is_upcoming(now)) {
            continue;
        }
        if let Some(ref term) = filter.query {
            if !event.title.to_lowercase().contains(&term.to_lowercase()) {
                continue;
            }
        }
        out.push(event);
    }
    out
}

#[async_trait]
impl BookingLedger for MemoryStore {
    async fn create(
        &self,
        event_id: i64,
        user_id: &str,
        quantity: i32,
        status: BookingStatus,
    ) -> Result<Booking, DomainError> {
        if quantity < 1 {
            return Err(DomainError::InvalidInput(
                "quantity must be at least 1".to_string(),
            ));
        }
        if !self.events.read().await.contains_key(&event_id) {
            return Err(DomainError::NotFound(format!("event {event_id}")));
        }
        let now = Utc::now();
        // The write lock makes the duplicate check and the insert atomic,
        // matching the SQL backend's partial unique index.
        let mut bookings = self.bookings.write().await;
        if !status.is_terminal()
            && bookings
                .values()
                .any(|b| b.event_id == event_id && b.user_id == user_id && !b.status.is_terminal())
        {
            return Err(DomainError::Conflict(
                "user already holds an active booking for this event".to_string(),
            ));
        }
        let id = self.booking_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let booking = Booking {
            id,
            event_id,
            user_id: user_id.to_string(),
            quantity,
            status,
            created_at: now,
            updated_at: now,
        };
        bookings.insert(id, booking.clone());
        Ok(booking)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Booking>, DomainError> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: &str, page: Page) -> Result<Vec<Booking>, DomainError> {
        Ok(select_bookings(self, |b| b.user_id == user_id, page).await)
    }

    async fn list_by_event(&self, event_id: i64, page: Page) -> Result<Vec<Booking>, DomainError> {
        Ok(select_bookings(self, |b| b.event_id == event_id, page).await)
    }

    async fn list_all(&self, page: Page) -> Result<Vec<Booking>, DomainError> {
        Ok(select_bookings(self, |_| true, page).await)
    }

    async fn find_active_for_user(
        &self,
        event_id: i64,
        user_id: &str,
    ) -> Result<Option<Booking>, DomainError> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .find(|b| b.event_id == event_id && b.user_id == user_id && !b.status.is_terminal())
            .cloned())
    }

    async fn transition(
        &self,
        id: i64,
        from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<(Booking, BookingStatus), DomainError> {
        // The write lock makes the compare-and-set atomic.
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(&id)
            .ok_or_else(|| DomainError::NotFound(format!("booking {id}")))?;
        let previous = booking.status;
        if !from.contains(&previous) {
            return Err(DomainError::InvalidStateTransition(previous));
        }
        booking.status = to;
        booking.updated_at = Utc::now();
        Ok((booking.clone(), previous))
    }
}

async fn select_bookings<F>(store: &MemoryStore, keep: F, page: Page) -> Vec<Booking>
where
    F: Fn(&Booking) -> bool,
{
    let mut out: Vec<Booking> = store
        .bookings
        .read()
        .await
        .values()
        .filter(|b| keep(b))
        .cloned()
        .collect();
    // Newest first, matching the SQL backend's ordering.
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    out.into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect()
}

#[async_trait]
impl SeatAllocator for MemoryStore {
    async fn reserve(&self, event_id: i64, quantity: i32) -> Result<(), DomainError> {
        let cell = self.event_cell(event_id).await?;
        let mut event = cell.lock().await;
        event.available_seats = debit_seats(event.available_seats, quantity)?;
        event.updated_at = Utc::now();
        Ok(())
    }

    async fn release(&self, event_id: i64, quantity: i32) -> Result<(), DomainError> {
        let cell = self.event_cell(event_id).await?;
        let mut event = cell.lock().await;
        let (next, clamped) = credit_seats(event.available_seats, event.total_seats, quantity)?;
        let had = event.available_seats;
        event.available_seats = next;
        event.updated_at = Utc::now();
        if clamped {
            error!(
                "release of {} seats on event {} exceeded capacity (had {}/{}), counter clamped",
                quantity, event_id, had, event.total_seats
            );
            return Err(DomainError::InternalConsistency(format!(
                "release exceeded total_seats on event {event_id}"
            )));
        }
        Ok(())
    }

    async fn reconcile_capacity(&self, event_id: i64, new_total: i32) -> Result<Event, DomainError> {
        let cell = self.event_cell(event_id).await?;
        let mut event = cell.lock().await;
        let new_available = reconcile_seats(event.total_seats, event.available_seats, new_total)?;
        event.total_seats = new_total;
        event.available_seats = new_available;
        event.updated_at = Utc::now();
        Ok(event.clone())
    }
}
