//! Concurrent booking tests against a shared store.
//!
//! Each race runs twice: on a private in-memory database, whose pool has a
//! single connection, and on a file database whose pool keeps several
//! transactions open at the same time.

use std::collections::HashMap;
use std::sync::Arc;

use booking_services::{
    BookingError, BookingPolicy, BookingService, BookingStore, FixedClock, ReservationLedger,
    SqliteBookingStore, StayRequest,
};
use chrono::{Days, NaiveDate};
use tempfile::TempDir;

const NUMBER_OF_BOOKINGS: u64 = 10;
const FILE_POOL_CONNECTIONS: u32 = 5;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 9, 1).unwrap()
}

fn plus(days: u64) -> NaiveDate {
    today() + Days::new(days)
}

fn request(check_in: u64, check_out: u64) -> StayRequest {
    StayRequest {
        email: Some("a@b.co".to_string()),
        full_name: Some("John Doe".to_string()),
        check_in_date: Some(plus(check_in)),
        check_out_date: Some(plus(check_out)),
    }
}

fn service_over(store: Arc<SqliteBookingStore>) -> Arc<BookingService> {
    Arc::new(BookingService::new(
        store,
        Arc::new(FixedClock(today())),
        BookingPolicy::default(),
    ))
}

async fn setup_in_memory() -> (Arc<BookingService>, Arc<SqliteBookingStore>) {
    let store = Arc::new(SqliteBookingStore::in_memory().await.unwrap());
    (service_over(store.clone()), store)
}

async fn setup_on_file() -> (Arc<BookingService>, Arc<SqliteBookingStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("bookings.db").display()
    );
    let store = SqliteBookingStore::connect(&url, FILE_POOL_CONNECTIONS)
        .await
        .unwrap();
    store.init_schema().await.unwrap();

    let store = Arc::new(store);
    (service_over(store.clone()), store, dir)
}

async fn claimed(store: &SqliteBookingStore) -> usize {
    ReservationLedger::claimed_within(store, plus(0), plus(30))
        .await
        .unwrap()
        .len()
}

async fn disjoint_bookings_and_one_contested(
    service: Arc<BookingService>,
    store: Arc<SqliteBookingStore>,
) {
    let mut handles = Vec::new();
    for i in 1..=NUMBER_OF_BOOKINGS {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.create(&request(i, i + 1)).await
        }));
    }
    let contested = {
        let service = service.clone();
        tokio::spawn(async move { service.create(&request(1, 3)).await })
    };

    let mut succeeded = 0;
    let mut unavailable = 0;
    for handle in handles.into_iter().chain(std::iter::once(contested)) {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(BookingError::Unavailable) => unavailable += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    // The two-night stay overlaps single-night stays on both of its nights,
    // so at most one of the competing bookings on each night can win.
    assert_eq!(succeeded + unavailable, NUMBER_OF_BOOKINGS + 1);
    assert!(unavailable >= 1);
    assert_eq!(claimed(&store).await as u64, NUMBER_OF_BOOKINGS);
}

async fn same_range_has_one_winner(service: Arc<BookingService>, store: Arc<SqliteBookingStore>) {
    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.create(&request(5, 8)).await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(stay) => winners.push(stay),
            Err(BookingError::Unavailable) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(winners.len(), 1);
    let nights = ReservationLedger::claimed_within(store.as_ref(), plus(0), plus(30))
        .await
        .unwrap();
    assert_eq!(nights, winners[0].nights());
}

async fn growing_updates_never_share_a_night(
    service: Arc<BookingService>,
    store: Arc<SqliteBookingStore>,
) {
    let first = service.create(&request(1, 2)).await.unwrap();
    let second = service.create(&request(4, 5)).await.unwrap();

    // Both stays try to grow into night 2..4 at the same time
    let grow_first = {
        let service = service.clone();
        let id = first.id;
        let partial = StayRequest {
            check_out_date: Some(plus(4)),
            ..Default::default()
        };
        tokio::spawn(async move { service.update(id, &partial).await })
    };
    let grow_second = {
        let service = service.clone();
        let id = second.id;
        let partial = StayRequest {
            check_in_date: Some(plus(2)),
            ..Default::default()
        };
        tokio::spawn(async move { service.update(id, &partial).await })
    };

    let outcomes = [grow_first.await.unwrap(), grow_second.await.unwrap()];
    for outcome in &outcomes {
        if let Err(e) = outcome {
            assert!(
                matches!(e, BookingError::Unavailable),
                "unexpected error: {e}"
            );
        }
    }
    let wins = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(wins, 1);

    let mut owners = HashMap::new();
    for stay_id in [first.id, second.id] {
        let stay = service.find(stay_id).await.unwrap();
        for night in stay.nights() {
            assert!(owners.insert(night, stay_id).is_none(), "night {night} owned twice");
        }
    }
    assert_eq!(claimed(&store).await, owners.len());
}

async fn separate_stays_change_independently(
    service: Arc<BookingService>,
    store: Arc<SqliteBookingStore>,
) {
    let mut stays = Vec::new();
    for i in 1..=NUMBER_OF_BOOKINGS {
        stays.push(service.create(&request(i, i + 1)).await.unwrap());
    }

    let mut handles = Vec::new();
    for round in 0..5 {
        for stay in &stays {
            let service = service.clone();
            let id = stay.id;
            let partial = StayRequest {
                full_name: Some(format!("Guest {round}")),
                ..Default::default()
            };
            handles.push(tokio::spawn(async move { service.update(id, &partial).await }));
        }
    }
    for handle in handles {
        if let Err(e) = handle.await.unwrap() {
            panic!("update of an uncontested stay failed: {e}");
        }
    }
    assert_eq!(claimed(&store).await as u64, NUMBER_OF_BOOKINGS);

    let mut handles = Vec::new();
    for stay in &stays {
        let service = service.clone();
        let id = stay.id;
        handles.push(tokio::spawn(async move { service.cancel(id).await }));
    }
    for handle in handles {
        if let Err(e) = handle.await.unwrap() {
            panic!("cancel of an uncontested stay failed: {e}");
        }
    }
    assert_eq!(claimed(&store).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_bookings_in_memory() {
    let (service, store) = setup_in_memory().await;
    disjoint_bookings_and_one_contested(service, store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_bookings_on_file() {
    let (service, store, _dir) = setup_on_file().await;
    disjoint_bookings_and_one_contested(service, store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_range_in_memory() {
    let (service, store) = setup_in_memory().await;
    same_range_has_one_winner(service, store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_range_on_file() {
    let (service, store, _dir) = setup_on_file().await;
    same_range_has_one_winner(service, store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_growing_updates_in_memory() {
    let (service, store) = setup_in_memory().await;
    growing_updates_never_share_a_night(service, store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_growing_updates_on_file() {
    let (service, store, _dir) = setup_on_file().await;
    growing_updates_never_share_a_night(service, store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_stays_change_independently_in_memory() {
    let (service, store) = setup_in_memory().await;
    separate_stays_change_independently(service, store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_stays_change_independently_on_file() {
    let (service, store, _dir) = setup_on_file().await;
    separate_stays_change_independently(service, store).await;
}
