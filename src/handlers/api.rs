use std::sync::Arc;

use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use super::AppState;
use super::rejection::{ApiError, reject};
use crate::service::auth::{AuthUser, bearer_token};
use crate::service::booking::{BookingRequest, CancelBody, RescheduleBody};

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub month: String,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

pub async fn authenticate(header: Option<String>, state: Arc<AppState>) -> Result<AuthUser, Rejection> {
    let token = bearer_token(header.as_deref()).map_err(reject)?;
    state.auth.user_from_token(token).await.map_err(reject)
}

pub async fn available_dates(
    query: MonthQuery,
    _user: AuthUser,
    state: Arc<AppState>,
) -> Result<warp::reply::Response, Rejection> {
    let dates = state
        .booking
        .availability_dates(&query.month)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&dates).into_response())
}

pub async fn available_times(
    query: DateQuery,
    _user: AuthUser,
    state: Arc<AppState>,
) -> Result<warp::reply::Response, Rejection> {
    let times = state
        .booking
        .availability_times(query.date)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&times).into_response())
}

pub async fn list_sessions(user: AuthUser, state: Arc<AppState>) -> Result<warp::reply::Response, Rejection> {
    let sessions = state.booking.sessions_for(&user).await.map_err(reject)?;
    Ok(warp::reply::json(&sessions).into_response())
}

pub async fn create_booking(
    user: AuthUser,
    request: BookingRequest,
    state: Arc<AppState>,
) -> Result<warp::reply::Response, Rejection> {
    let session = state
        .booking
        .book(&user, &request, Utc::now())
        .await
        .map_err(reject)?;
    Ok(warp::reply::with_status(warp::reply::json(&session), StatusCode::CREATED).into_response())
}

pub async fn reschedule_booking(
    appointment_id: u64,
    user: AuthUser,
    body: RescheduleBody,
    state: Arc<AppState>,
) -> Result<warp::reply::Response, Rejection> {
    let session = state
        .booking
        .reschedule(&user, appointment_id, &body.datetime, Utc::now())
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&session).into_response())
}

/// The body is optional here; an empty one means no cancel note.
pub async fn cancel_booking(
    appointment_id: u64,
    user: AuthUser,
    body: Bytes,
    state: Arc<AppState>,
) -> Result<warp::reply::Response, Rejection> {
    let body: CancelBody = if body.iter().all(u8::is_ascii_whitespace) {
        CancelBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| reject(ApiError::bad_request(format!("invalid cancel body: {e}"))))?
    };
    let session = state
        .booking
        .cancel(&user, appointment_id, body.note.as_deref())
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&session).into_response())
}
