mod common;

use common::{upcoming_event, user};
use event_booking::error::DomainError;
use event_booking::services::BookingService;
use event_booking::store::{EventStore, MemoryStore, SeatAllocator};
use proptest::prelude::*;
use std::sync::Arc;

async fn event_with_seats(store: &Arc<MemoryStore>, title: &str, seats: i32) -> i64 {
    EventStore::create(store.as_ref(), upcoming_event(title, seats))
        .await
        .unwrap()
        .id
}

async fn available(store: &Arc<MemoryStore>, event_id: i64) -> i32 {
    EventStore::find_by_id(store.as_ref(), event_id)
        .await
        .unwrap()
        .unwrap()
        .available_seats
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_reserves_never_oversell() {
    let store = Arc::new(MemoryStore::new());
    let event_id = event_with_seats(&store, "rush hour", 10).await;

    let mut handles = Vec::new();
    for _ in 0..50 {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.reserve(event_id, 1).await }));
    }

    let mut won = 0;
    let mut turned_away = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => won += 1,
            Err(DomainError::InsufficientSeats { .. }) => turned_away += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(won, 10);
    assert_eq!(turned_away, 40);
    assert_eq!(available(&store, event_id).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reserves_on_different_events_do_not_interfere() {
    let store = Arc::new(MemoryStore::new());
    let first = event_with_seats(&store, "first", 20).await;
    let second = event_with_seats(&store, "second", 20).await;

    let mut handles = Vec::new();
    for i in 0..40 {
        let store = store.clone();
        let target = if i % 2 == 0 { first } else { second };
        handles.push(tokio::spawn(async move { store.reserve(target, 1).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(available(&store, first).await, 0);
    assert_eq!(available(&store, second).await, 0);
}

// Two bookings race for the last two seats: one asks for 1, the other for 2.
// Whichever wins, the loser must fail and the counter must account for
// exactly the winner's quantity.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_seats_race_admits_exactly_one_winner() {
    for _ in 0..25 {
        let store = Arc::new(MemoryStore::new());
        let event_id = event_with_seats(&store, "finale", 2).await;
        let service = BookingService::new(store.clone(), store.clone(), store.clone());

        let svc_a = service.clone();
        let a = tokio::spawn(async move { svc_a.create_booking(&user("alice"), event_id, 1).await });
        let svc_b = service.clone();
        let b = tokio::spawn(async move { svc_b.create_booking(&user("bob"), event_id, 2).await });

        let outcomes = [a.await.unwrap(), b.await.unwrap()];
        let winners: Vec<i32> = outcomes
            .iter()
            .filter_map(|r| r.as_ref().ok().map(|b| b.quantity))
            .collect();
        for outcome in &outcomes {
            if let Err(err) = outcome {
                assert!(
                    matches!(err, DomainError::InsufficientSeats { .. }),
                    "loser must see InsufficientSeats, got {:?}",
                    err
                );
            }
        }

        assert_eq!(winners.len(), 1, "exactly one booking must win");
        assert_eq!(available(&store, event_id).await, 2 - winners[0]);
    }
}

#[tokio::test]
async fn release_beyond_capacity_is_clamped_and_reported() {
    let store = Arc::new(MemoryStore::new());
    let event_id = event_with_seats(&store, "clamp", 10).await;
    store.reserve(event_id, 2).await.unwrap();

    let err = store.release(event_id, 5).await.unwrap_err();
    assert!(matches!(err, DomainError::InternalConsistency(_)));
    // The counter is repaired, not corrupted.
    assert_eq!(available(&store, event_id).await, 10);
}

#[tokio::test]
async fn capacity_shrink_below_committed_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let event_id = event_with_seats(&store, "shrink", 10).await;
    store.reserve(event_id, 8).await.unwrap();

    let err = store.reconcile_capacity(event_id, 5).await.unwrap_err();
    match err {
        DomainError::CapacityConflict { committed } => assert_eq!(committed, 8),
        other => panic!("expected CapacityConflict, got {:?}", other),
    }
    let event = EventStore::find_by_id(store.as_ref(), event_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.total_seats, 10);
    assert_eq!(event.available_seats, 2);

    // Shrinking to exactly the committed quantity and growing both work.
    let event = store.reconcile_capacity(event_id, 8).await.unwrap();
    assert_eq!((event.total_seats, event.available_seats), (8, 0));
    let event = store.reconcile_capacity(event_id, 12).await.unwrap();
    assert_eq!((event.total_seats, event.available_seats), (12, 4));
}

proptest! {
    // Conservation: available + reserved == total after every operation, for
    // arbitrary interleavings of reserves and releases.
    #[test]
    fn conservation_holds_for_any_reserve_release_sequence(
        ops in proptest::collection::vec((any::<bool>(), 1..=4i32), 1..50)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            const TOTAL: i32 = 12;
            let store = Arc::new(MemoryStore::new());
            let event_id = event_with_seats(&store, "conservation", TOTAL).await;
            let mut reserved = 0i32;

            for (is_reserve, qty) in ops {
                if is_reserve {
                    match store.reserve(event_id, qty).await {
                        Ok(()) => reserved += qty,
                        Err(DomainError::InsufficientSeats { .. }) => {}
                        Err(other) => panic!("unexpected error: {:?}", other),
                    }
                } else if reserved > 0 {
                    let give_back = qty.min(reserved);
                    store.release(event_id, give_back).await.unwrap();
                    reserved -= give_back;
                }
                prop_assert_eq!(available(&store, event_id).await + reserved, TOTAL);
            }
            Ok(())
        })?;
    }
}
