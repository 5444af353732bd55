use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, warn};

use crate::error::DomainError;
use crate::models::{Booking, BookingStatus, Event};

use super::{
    credit_seats, debit_seats, reconcile_seats, BookingLedger, EventFilter, EventPatch, EventStore,
    NewEvent, Page, SeatAllocator,
};

/// Postgres-backed store. Seat allocation uses pessimistic row locks
/// (`SELECT ... FOR UPDATE` on the event row) so the authoritative counter
/// lives in the database and horizontally scaled workers stay correct.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

/// Lock waits are bounded per allocator transaction; hitting the ceiling is
/// a retryable condition, not a bug.
const LOCK_TIMEOUT_SQL: &str = "SET LOCAL lock_timeout = '5s'";

fn map_lock_err(e: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(ref db_err) = e {
        // 55P03 = lock_not_available
        if db_err.code().as_deref() == Some("55P03") {
            return DomainError::TransientConflict;
        }
    }
    DomainError::Database(e)
}

#[async_trait]
impl EventStore for PgStore {
    async fn create(&self, new: NewEvent) -> Result<Event, DomainError> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (title, description, venue, date, total_seats, available_seats, price)
            VALUES ($1, $2, $3, $4, $5, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.venue)
        .bind(new.date)
        .bind(new.total_seats)
        .bind(new.price)
        .fetch_one(&self.pool)
        .await?;
        Ok(event)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Event>, DomainError> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    async fn find_by_title(&self, title: &str) -> Result<Option<Event>, DomainError> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE title = $1 LIMIT 1")
            .bind(title)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    async fn list(&self, filter: &EventFilter, page: Page) -> Result<Vec<Event>, DomainError> {
        let mut q = String::from("SELECT * FROM events");
        let mut bind_idx = 1;
        let mut clauses: Vec<String> = Vec::new();
        if filter.available_only {
            clauses.push("available_seats > 0 AND date > NOW()".to_string());
        }
        if filter.query.is_some() {
            clauses.push(format!("title ILIKE ${bind_idx}"));
            bind_idx += 1;
        }
        if !clauses.is_empty() {
            q.push_str(" WHERE ");
            q.push_str(&clauses.join(" AND "));
        }
        q.push_str(&format!(" ORDER BY date LIMIT ${} OFFSET ${}", bind_idx, bind_idx + 1));

        let mut dbq = sqlx::query_as::<_, Event>(&q);
        if let Some(ref term) = filter.query {
            dbq = dbq.bind(format!("%{}%", term));
        }
        let events = dbq
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    async fn count(&self, filter: &EventFilter) -> Result<i64, DomainError> {
        let mut q = String::from("SELECT COUNT(*) FROM events");
        let mut clauses: Vec<String> = Vec::new();
        if filter.available_only {
            clauses.push("available_seats > 0 AND date > NOW()".to_string());
        }
        if filter.query.is_some() {
            clauses.push("title ILIKE $1".to_string());
        }
        if !clauses.is_empty() {
            q.push_str(" WHERE ");
            q.push_str(&clauses.join(" AND "));
        }
        let mut dbq = sqlx::query_scalar::<_, i64>(&q);
        if let Some(ref term) = filter.query {
            dbq = dbq.bind(format!("%{}%", term));
        }
        Ok(dbq.fetch_one(&self.pool).await?)
    }

    async fn update(&self, id: i64, patch: EventPatch) -> Result<Event, DomainError> {
        if patch.is_empty() {
            return EventStore::find_by_id(self, id)
                .await?
                .ok_or_else(|| DomainError::NotFound(format!("event {id}")));
        }

        let mut sets = vec!["updated_at = NOW()".to_string()];
        let mut bind_idx = 2;
        for (present, column) in [
            (patch.title.is_some(), "title"),
            (patch.description.is_some(), "description"),
            (patch.venue.is_some(), "venue"),
            (patch.date.is_some(), "date"),
            (patch.price.is_some(), "price"),
        ] {
            if present {
                sets.push(format!("{column} = ${bind_idx}"));
                bind_idx += 1;
            }
        }
        let q = format!("UPDATE events SET {} WHERE id = $1 RETURNING *", sets.join(", "));

        let mut dbq = sqlx::query_as::<_, Event>(&q).bind(id);
        if let Some(title) = patch.title {
            dbq = dbq.bind(title);
        }
        if let Some(description) = patch.description {
            dbq = dbq.bind(description);
        }
        if let Some(venue) = patch.venue {
            dbq = dbq.bind(venue);
        }
        if let Some(date) = patch.date {
            dbq = dbq.bind(date);
        }
        if let Some(price) = patch.price {
            dbq = dbq.bind(price);
        }

        dbq.fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("event {id}")))
    }

    async fn delete(&self, id: i64) -> Result<(), DomainError> {
        // Bookings go with the event via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("event {id}")));
        }
        warn!("event {} deleted, its bookings are gone with it", id);
        Ok(())
    }
}

#[async_trait]
impl BookingLedger for PgStore {
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
        let result = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (event_id, user_id, quantity, status)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(quantity)
        .bind(status)
        .fetch_one(&self.pool)
        .await;

        result.map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                // 23503 = foreign_key_violation: the event vanished underneath us
                if db_err.code().as_deref() == Some("23503") {
                    return DomainError::NotFound(format!("event {event_id}"));
                }
                // 23505 = unique_violation on the one-active-booking index
                if db_err.code().as_deref() == Some("23505") {
                    return DomainError::Conflict(
                        "user already holds an active booking for this event".to_string(),
                    );
                }
            }
            DomainError::Database(e)
        })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Booking>, DomainError> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(booking)
    }

    async fn list_by_user(&self, user_id: &str, page: Page) -> Result<Vec<Booking>, DomainError> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn list_by_event(&self, event_id: i64, page: Page) -> Result<Vec<Booking>, DomainError> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE event_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(event_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn list_all(&self, page: Page) -> Result<Vec<Booking>, DomainError> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn find_active_for_user(
        &self,
        event_id: i64,
        user_id: &str,
    ) -> Result<Option<Booking>, DomainError> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE event_id = $1 AND user_id = $2 AND status IN ('pending', 'confirmed')
            LIMIT 1
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn transition(
        &self,
        id: i64,
        from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<(Booking, BookingStatus), DomainError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(LOCK_TIMEOUT_SQL).execute(&mut *tx).await?;

        let current = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_lock_err)?
            .ok_or_else(|| DomainError::NotFound(format!("booking {id}")))?;

        if !from.contains(&current.status) {
            // Dropping the transaction rolls the lock back.
            return Err(DomainError::InvalidStateTransition(current.status));
        }

        let updated = sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(to)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((updated, current.status))
    }
}

#[async_trait]
impl SeatAllocator for PgStore {
    async fn reserve(&self, event_id: i64, quantity: i32) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(LOCK_TIMEOUT_SQL).execute(&mut *tx).await?;

        let row = sqlx::query_as::<_, (i32, i32)>(
            "SELECT total_seats, available_seats FROM events WHERE id = $1 FOR UPDATE",
        )
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_lock_err)?
        .ok_or_else(|| DomainError::NotFound(format!("event {event_id}")))?;

        let (_, available) = row;
        let next = debit_seats(available, quantity)?;

        sqlx::query("UPDATE events SET available_seats = $2, updated_at = NOW() WHERE id = $1")
            .bind(event_id)
            .bind(next)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn release(&self, event_id: i64, quantity: i32) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(LOCK_TIMEOUT_SQL).execute(&mut *tx).await?;

        let (total, available) = sqlx::query_as::<_, (i32, i32)>(
            "SELECT total_seats, available_seats FROM events WHERE id = $1 FOR UPDATE",
        )
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_lock_err)?
        .ok_or_else(|| DomainError::NotFound(format!("event {event_id}")))?;

        let (next, clamped) = credit_seats(available, total, quantity)?;

        sqlx::query("UPDATE events SET available_seats = $2, updated_at = NOW() WHERE id = $1")
            .bind(event_id)
            .bind(next)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if clamped {
            error!(
                "release of {} seats on event {} exceeded capacity (had {}/{}), counter clamped",
                quantity, event_id, available, total
            );
            return Err(DomainError::InternalConsistency(format!(
                "release exceeded total_seats on event {event_id}"
            )));
        }
        Ok(())
    }

    async fn reconcile_capacity(&self, event_id: i64, new_total: i32) -> Result<Event, DomainError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(LOCK_TIMEOUT_SQL).execute(&mut *tx).await?;

        let (total, available) = sqlx::query_as::<_, (i32, i32)>(
            "SELECT total_seats, available_seats FROM events WHERE id = $1 FOR UPDATE",
        )
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_lock_err)?
        .ok_or_else(|| DomainError::NotFound(format!("event {event_id}")))?;

        let new_available = reconcile_seats(total, available, new_total)?;

        let event = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events
            SET total_seats = $2, available_seats = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(new_total)
        .bind(new_available)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(event)
    }
}
