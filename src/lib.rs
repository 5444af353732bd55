pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;

use std::sync::Arc;

use services::{BookingService, EventService};
use store::{BookingLedger, EventStore, SeatAllocator};

// Shared state for the whole application
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub events: EventService,
    pub bookings: BookingService,
}

impl AppState {
    pub fn new(
        config: config::Config,
        events: Arc<dyn EventStore>,
        ledger: Arc<dyn BookingLedger>,
        allocator: Arc<dyn SeatAllocator>,
    ) -> Arc<Self> {
        Arc::new(AppState {
            events: EventService::new(events.clone(), allocator.clone()),
            bookings: BookingService::new(events, ledger, allocator),
            config,
        })
    }

    /// Wire all three storage ports to a single backend.
    pub fn from_store<S>(config: config::Config, store: Arc<S>) -> Arc<Self>
    where
        S: EventStore + BookingLedger + SeatAllocator + 'static,
    {
        AppState::new(config, store.clone(), store.clone(), store)
    }
}
