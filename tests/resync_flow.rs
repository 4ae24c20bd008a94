mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{TimeZone, Utc};
use chrono_tz::America::New_York;
use common::{FakeScheduler, appointment};
use fieldBooking::models::session::SessionStatus;
use fieldBooking::service::reconcile::Reconciler;
use fieldBooking::service::session_store::{MemorySessionStore, SessionStore};
use fieldBooking::tasks::resync_loop::{ResyncReport, resync_tick};
use fieldBooking::tasks::task_runner::TaskRunner;

#[tokio::test]
async fn resync_catches_up_on_missed_webhooks() {
    let scheduler = Arc::new(FakeScheduler::new());
    let store = Arc::new(MemorySessionStore::new());
    let reconciler = Reconciler::new(scheduler.clone(), store.clone(), New_York);
    let now = Utc.with_ymd_and_hms(2026, 6, 10, 12, 0, 0).unwrap();

    scheduler.insert(appointment(1001)).await;
    let mut other = appointment(1002);
    other.email = Some("bob@example.com".to_string());
    scheduler.insert(other).await;
    let mut no_email = appointment(1003);
    no_email.email = None;
    scheduler.insert(no_email).await;

    let first = resync_tick(&reconciler, scheduler.as_ref(), now, 14).await.unwrap();
    assert_eq!(
        first,
        ResyncReport {
            seen: 3,
            created: 2,
            updated: 0,
            unchanged: 0,
            skipped: 1,
            failed: 0,
        }
    );

    let mut canceled = appointment(1001);
    canceled.canceled = true;
    scheduler.insert(canceled).await;
    let second = resync_tick(&reconciler, scheduler.as_ref(), now, 14).await.unwrap();
    assert_eq!(second.updated, 1);
    assert_eq!(second.unchanged, 1);

    let stored = store.find_by_email("ada@example.com").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, SessionStatus::Canceled);
}

#[tokio::test]
async fn resync_fails_only_when_listing_fails() {
    let scheduler = Arc::new(FakeScheduler::new());
    let store = Arc::new(MemorySessionStore::new());
    let reconciler = Reconciler::new(scheduler.clone(), store, New_York);
    scheduler.set_unreachable(true);

    let result = resync_tick(&reconciler, scheduler.as_ref(), Utc::now(), 14).await;
    assert!(result.is_err());
}

#[test]
fn task_runner_starts_every_task() {
    let started = Arc::new(AtomicUsize::new(0));
    let mut runner = TaskRunner::new();
    for name in ["first", "second"] {
        let started = started.clone();
        runner.add_task(name, move || {
            started.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(runner.len(), 2);
    runner.start_all();
    assert_eq!(started.load(Ordering::SeqCst), 2);
}
