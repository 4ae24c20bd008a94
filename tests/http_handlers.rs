mod common;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono_tz::America::New_York;
use common::{FakeScheduler, appointment, form_body};
use fieldBooking::events::queue::{Event, EventBus};
use fieldBooking::handlers::rejection::handle_rejection;
use fieldBooking::handlers::{AppState, api, webhook};
use fieldBooking::models::webhook::WebhookAction;
use fieldBooking::service::auth::{AuthError, AuthProvider, AuthUser};
use fieldBooking::service::booking::{BookingRequest, BookingService};
use fieldBooking::service::reconcile::Reconciler;
use fieldBooking::service::session_store::MemorySessionStore;
use tokio::sync::mpsc;
use warp::Rejection;
use warp::http::StatusCode;

struct FakeAuth;

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn user_from_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        match token {
            "ada-token" => Ok(AuthUser {
                id: "user-ada".to_string(),
                email: "ada@example.com".to_string(),
            }),
            "bob-token" => Ok(AuthUser {
                id: "user-bob".to_string(),
                email: "bob@example.com".to_string(),
            }),
            _ => Err(AuthError::InvalidToken),
        }
    }
}

fn state(webhook_token: Option<&str>) -> (Arc<AppState>, mpsc::Receiver<Event>, Arc<FakeScheduler>) {
    let scheduler = Arc::new(FakeScheduler::new());
    let store = Arc::new(MemorySessionStore::new());
    let reconciler = Arc::new(Reconciler::new(scheduler.clone(), store.clone(), New_York));
    let booking = Arc::new(BookingService::new(
        scheduler.clone(),
        store,
        reconciler,
        777,
        None,
    ));
    let (bus, rx) = EventBus::new(4);
    let state = Arc::new(AppState {
        bus,
        booking,
        auth: Arc::new(FakeAuth),
        webhook_token: webhook_token.map(str::to_string),
    });
    (state, rx, scheduler)
}

async fn status_of(result: Result<warp::reply::Response, Rejection>) -> StatusCode {
    match result {
        Ok(response) => response.status(),
        Err(rejection) => handle_rejection(rejection).await.unwrap().status(),
    }
}

fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[tokio::test]
async fn webhook_is_acknowledged_and_queued() {
    let (state, mut rx, _) = state(Some("s3cret"));

    let status = status_of(
        webhook::receive_webhook(
            query(&[("token", "s3cret")]),
            Some("application/x-www-form-urlencoded".to_string()),
            Bytes::from(form_body("appointment.rescheduled", 1001)),
            state,
        )
        .await,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let Some(Event::WebhookReceived { payload, .. }) = rx.recv().await else {
        panic!("expected a queued webhook");
    };
    assert_eq!(payload.action, WebhookAction::Rescheduled);
    assert_eq!(payload.appointment_id, Some(1001));
    assert_eq!(payload.calendar_id, Some(42));
}

#[tokio::test]
async fn webhook_with_wrong_token_is_unauthorized() {
    let (state, mut rx, _) = state(Some("s3cret"));

    let status = status_of(
        webhook::receive_webhook(
            query(&[("token", "guess")]),
            None,
            Bytes::from(form_body("appointment.scheduled", 1001)),
            state.clone(),
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let status = status_of(
        webhook::receive_webhook(
            HashMap::new(),
            None,
            Bytes::from(form_body("appointment.scheduled", 1001)),
            state,
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn unparseable_webhook_is_a_bad_request() {
    let (state, _rx, _) = state(None);

    let status = status_of(
        webhook::receive_webhook(
            HashMap::new(),
            Some("application/json".to_string()),
            Bytes::from_static(b"{\"action\": "),
            state.clone(),
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let status = status_of(
        webhook::receive_webhook(HashMap::new(), None, Bytes::new(), state).await,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn authentication_requires_a_known_bearer_token() {
    let (state, _rx, _) = state(None);

    let user = api::authenticate(Some("Bearer ada-token".to_string()), state.clone())
        .await
        .unwrap();
    assert_eq!(user.id, "user-ada");

    for header in [None, Some("ada-token".to_string()), Some("Bearer nope".to_string())] {
        let rejection = api::authenticate(header, state.clone()).await.unwrap_err();
        let response = handle_rejection(rejection).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn booking_routes_map_outcomes_to_statuses() {
    let (state, _rx, scheduler) = state(None);
    let ada = api::authenticate(Some("Bearer ada-token".to_string()), state.clone())
        .await
        .unwrap();
    let bob = api::authenticate(Some("Bearer bob-token".to_string()), state.clone())
        .await
        .unwrap();

    let request = BookingRequest {
        datetime: "2099-06-17T10:15".to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        phone: None,
        notes: None,
    };
    let status = status_of(api::create_booking(ada.clone(), request, state.clone()).await).await;
    assert_eq!(status, StatusCode::CREATED);
    let appointment_id = *scheduler.appointments.lock().await.keys().next().unwrap();

    let status = status_of(
        api::cancel_booking(appointment_id, bob, Bytes::new(), state.clone()).await,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let status = status_of(
        api::cancel_booking(appointment_id, ada.clone(), Bytes::from_static(b"{\"note\": 5}"), state.clone())
            .await,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let status = status_of(
        api::cancel_booking(appointment_id, ada.clone(), Bytes::new(), state.clone()).await,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let status = status_of(api::cancel_booking(9, ada.clone(), Bytes::new(), state.clone()).await).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let status = status_of(api::list_sessions(ada, state).await).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn availability_rejects_malformed_month() {
    let (state, _rx, scheduler) = state(None);
    scheduler.insert(appointment(1)).await;
    let ada = api::authenticate(Some("Bearer ada-token".to_string()), state.clone())
        .await
        .unwrap();

    let status = status_of(
        api::available_dates(
            api::MonthQuery {
                month: "2026-13".to_string(),
            },
            ada.clone(),
            state.clone(),
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    scheduler.set_unreachable(true);
    let status = status_of(
        api::available_dates(
            api::MonthQuery {
                month: "2026-06".to_string(),
            },
            ada,
            state,
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}
