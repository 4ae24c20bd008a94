use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use serde_json::json;
use warp::{Filter, Rejection, Reply};

use crate::events::queue::EventBus;
use crate::service::auth::{AuthProvider, AuthUser};
use crate::service::booking::BookingService;

pub mod api;
pub mod rejection;
pub mod webhook;

const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Everything the HTTP handlers share.
pub struct AppState {
    pub bus: EventBus,
    pub booking: Arc<BookingService>,
    pub auth: Arc<dyn AuthProvider>,
    pub webhook_token: Option<String>,
}

fn with_state(state: Arc<AppState>) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn with_user(state: Arc<AppState>) -> impl Filter<Extract = (AuthUser,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_state(state))
        .and_then(api::authenticate)
}

/// All routes, without rejection recovery. Wrap with
/// `.recover(rejection::handle_rejection)` before serving.
pub fn routes(state: Arc<AppState>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "status": "ok" })));

    let webhook = warp::path!("webhooks" / "scheduler")
        .and(warp::post())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::header::optional::<String>("content-type"))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_state(state.clone()))
        .and_then(webhook::receive_webhook);

    let dates = warp::path!("api" / "availability" / "dates")
        .and(warp::get())
        .and(warp::query::<api::MonthQuery>())
        .and(with_user(state.clone()))
        .and(with_state(state.clone()))
        .and_then(api::available_dates);

    let times = warp::path!("api" / "availability" / "times")
        .and(warp::get())
        .and(warp::query::<api::DateQuery>())
        .and(with_user(state.clone()))
        .and(with_state(state.clone()))
        .and_then(api::available_times);

    let sessions = warp::path!("api" / "sessions")
        .and(warp::get())
        .and(with_user(state.clone()))
        .and(with_state(state.clone()))
        .and_then(api::list_sessions);

    let book = warp::path!("api" / "bookings")
        .and(warp::post())
        .and(with_user(state.clone()))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(api::create_booking);

    let reschedule = warp::path!("api" / "bookings" / u64 / "reschedule")
        .and(warp::post())
        .and(with_user(state.clone()))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(api::reschedule_booking);

    let cancel = warp::path!("api" / "bookings" / u64 / "cancel")
        .and(warp::post())
        .and(with_user(state.clone()))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_state(state))
        .and_then(api::cancel_booking);

    health
        .or(webhook)
        .or(dates)
        .or(times)
        .or(sessions)
        .or(book)
        .or(reschedule)
        .or(cancel)
}
