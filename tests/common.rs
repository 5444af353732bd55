#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::{Duration, Utc};
use event_booking::{
    config::Config,
    controllers,
    middleware::{Identity, Role, USER_ID_HEADER, USER_ROLE_HEADER},
    store::{MemoryStore, NewEvent},
    AppState,
};
use serde_json::Value;
use std::sync::Arc;

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::from_store(Config::from_env(), store.clone());
        let router = controllers::router(state.clone());
        TestApp {
            router,
            store,
            state,
        }
    }
}

pub fn user(id: &str) -> Identity {
    Identity {
        user_id: id.to_string(),
        role: Role::User,
    }
}

pub fn admin(id: &str) -> Identity {
    Identity {
        user_id: id.to_string(),
        role: Role::Admin,
    }
}

/// An event a week out, the usual fixture.
pub fn upcoming_event(title: &str, seats: i32) -> NewEvent {
    NewEvent {
        title: title.to_string(),
        description: Some("fixture".to_string()),
        venue: Some("Main Hall".to_string()),
        date: Utc::now() + Duration::days(7),
        total_seats: seats,
        price: 25.0,
    }
}

pub fn request(method: Method, uri: &str, identity: Option<(&str, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = identity {
        builder = builder.header(USER_ID_HEADER, id).header(USER_ROLE_HEADER, role);
    }
    match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn parse_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
