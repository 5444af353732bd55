use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::error::DomainError;
use crate::middleware::Identity;
use crate::models::{Booking, BookingStatus};
use crate::store::{BookingLedger, EventStore, Page, SeatAllocator};

/// The booking orchestrator: composes the seat allocator and the ledger into
/// the two business transactions, and owns authorization and the status
/// state machine. Reserve-then-record is made all-or-nothing by a
/// compensating release when the ledger write fails.
#[derive(Clone)]
pub struct BookingService {
    events: Arc<dyn EventStore>,
    ledger: Arc<dyn BookingLedger>,
    allocator: Arc<dyn SeatAllocator>,
}

impl BookingService {
    pub fn new(
        events: Arc<dyn EventStore>,
        ledger: Arc<dyn BookingLedger>,
        allocator: Arc<dyn SeatAllocator>,
    ) -> Self {
        BookingService {
            events,
            ledger,
            allocator,
        }
    }

    pub async fn create_booking(
        &self,
        acting: &Identity,
        event_id: i64,
        quantity: i32,
    ) -> Result<Booking, DomainError> {
        if quantity < 1 {
            return Err(DomainError::InvalidInput(
                "quantity must be at least 1".to_string(),
            ));
        }

        let event = self
            .events
            .find_by_id(event_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("event {event_id}")))?;
        if !event.is_upcoming(Utc::now()) {
            return Err(DomainError::InvalidInput(
                "cannot book an event whose date has passed".to_string(),
            ));
        }
        if self
            .ledger
            .find_active_for_user(event_id, &acting.user_id)
            .await?
            .is_some()
        {
            return Err(DomainError::Conflict(
                "you already have an active booking for this event".to_string(),
            ));
        }

        self.allocator.reserve(event_id, quantity).await?;

        match self
            .ledger
            .create(event_id, &acting.user_id, quantity, BookingStatus::Confirmed)
            .await
        {
            Ok(booking) => {
                info!(
                    "booking {} confirmed: {} seat(s) on event {} for {}",
                    booking.id, quantity, event_id, acting.user_id
                );
                Ok(booking)
            }
            Err(err) => {
                // The seats are held but no booking records them; give them
                // back before surfacing the failure.
                if let Err(release_err) = self.allocator.release(event_id, quantity).await {
                    error!(
                        "failed to roll back reservation of {} seat(s) on event {}: {}",
                        quantity, event_id, release_err
                    );
                }
                Err(err)
            }
        }
    }

    pub async fn cancel_booking(
        &self,
        acting: &Identity,
        booking_id: i64,
    ) -> Result<Booking, DomainError> {
        self.close_booking(acting, booking_id, BookingStatus::Cancelled)
            .await
    }

    /// Same seat-release semantics as cancellation; expiry is invoked
    /// administratively rather than by a background sweeper.
    pub async fn expire_booking(
        &self,
        acting: &Identity,
        booking_id: i64,
    ) -> Result<Booking, DomainError> {
        acting.require_admin()?;
        self.close_booking(acting, booking_id, BookingStatus::Expired)
            .await
    }

    async fn close_booking(
        &self,
        acting: &Identity,
        booking_id: i64,
        terminal: BookingStatus,
    ) -> Result<Booking, DomainError> {
        let booking = self
            .ledger
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("booking {booking_id}")))?;
        if !acting.is_admin() && acting.user_id != booking.user_id {
            return Err(DomainError::Unauthorized);
        }

        // The CAS admits each booking into a terminal status exactly once,
        // so the release below cannot run twice even under racing cancels.
        let (closed, previous) = self
            .ledger
            .transition(
                booking_id,
                &[BookingStatus::Pending, BookingStatus::Confirmed],
                terminal,
            )
            .await?;

        if previous.holds_seats() {
            if let Err(release_err) = self
                .allocator
                .release(closed.event_id, closed.quantity)
                .await
            {
                // A clamp means the seats are already accounted for; the
                // close stands and the violation is surfaced as-is.
                if matches!(release_err, DomainError::InternalConsistency(_)) {
                    return Err(release_err);
                }
                // The booking must not stay closed while its seats are still
                // held. Reopen it so a retry can release them.
                if let Err(reopen_err) = self
                    .ledger
                    .transition(booking_id, &[terminal], previous)
                    .await
                {
                    error!(
                        "booking {} is {} but its {} seat(s) on event {} are still held and reopening failed: {}",
                        booking_id, terminal, closed.quantity, closed.event_id, reopen_err
                    );
                    return Err(DomainError::InternalConsistency(format!(
                        "booking {booking_id} closed without releasing its seats"
                    )));
                }
                return Err(release_err);
            }
        }
        info!(
            "booking {} moved {} -> {} by {}",
            booking_id, previous, terminal, acting.user_id
        );
        Ok(closed)
    }

    pub async fn get_booking(
        &self,
        acting: &Identity,
        booking_id: i64,
    ) -> Result<Booking, DomainError> {
        let booking = self
            .ledger
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("booking {booking_id}")))?;
        if !acting.is_admin() && acting.user_id != booking.user_id {
            return Err(DomainError::Unauthorized);
        }
        Ok(booking)
    }

    pub async fn list_own(&self, acting: &Identity, page: Page) -> Result<Vec<Booking>, DomainError> {
        self.ledger.list_by_user(&acting.user_id, page).await
    }

    pub async fn list_by_event(
        &self,
        acting: &Identity,
        event_id: i64,
        page: Page,
    ) -> Result<Vec<Booking>, DomainError> {
        acting.require_admin()?;
        self.events
            .find_by_id(event_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("event {event_id}")))?;
        self.ledger.list_by_event(event_id, page).await
    }

    pub async fn list_all(&self, acting: &Identity, page: Page) -> Result<Vec<Booking>, DomainError> {
        acting.require_admin()?;
        self.ledger.list_all(page).await
    }
}
