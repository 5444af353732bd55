use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub venue: Option<String>,
    pub date: DateTime<Utc>,
    pub total_seats: i32,
    pub available_seats: i32,
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Seats held by live bookings. Always `total - available` because
    /// `available_seats` is only ever written by the seat allocator.
    pub fn committed_seats(&self) -> i32 {
        self.total_seats - self.available_seats
    }

    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.date > now
    }
}
