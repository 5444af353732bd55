use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Booking lifecycle. `pending` and `confirmed` are active, the rest are
/// terminal. Only `confirmed` holds seats; a pending booking has not been
/// through the allocator yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Expired)
    }

    /// Whether a booking in this status holds seats that must be released
    /// when it closes.
    pub fn holds_seats(&self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }

    pub fn can_transition_to(&self, to: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, to),
            (Pending, Confirmed) | (Pending, Cancelled) | (Pending, Expired)
                | (Confirmed, Cancelled)
                | (Confirmed, Expired)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub event_id: i64,
    pub user_id: String,
    pub quantity: i32,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::BookingStatus::*;

    #[test]
    fn terminal_statuses_admit_no_transition() {
        for terminal in [Cancelled, Expired] {
            for to in [Pending, Confirmed, Cancelled, Expired] {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }

    #[test]
    fn active_statuses_close_but_never_reopen() {
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Expired));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Expired));
        assert!(!Confirmed.can_transition_to(Pending));
    }

    #[test]
    fn only_confirmed_holds_seats() {
        assert!(Confirmed.holds_seats());
        assert!(!Pending.holds_seats());
        assert!(!Cancelled.holds_seats());
        assert!(!Expired.holds_seats());
    }
}
