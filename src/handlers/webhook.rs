use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use super::AppState;
use super::rejection::{ApiError, reject};
use crate::events::queue::Event;
use crate::models::webhook::WebhookPayload;

/// Accepts a scheduler webhook and queues it for reconciliation.
///
/// Anything that parses is acknowledged with 200: the provider retries
/// non-2xx responses and reconciliation failures are not its concern.
pub async fn receive_webhook(
    query: HashMap<String, String>,
    content_type: Option<String>,
    body: Bytes,
    state: Arc<AppState>,
) -> Result<warp::reply::Response, Rejection> {
    if let Some(expected) = state.webhook_token.as_deref() {
        let given = query.get("token").map(String::as_str).unwrap_or_default();
        if !token_matches(given, expected) {
            warn!("webhook rejected: bad token");
            return Err(reject(ApiError::unauthorized("invalid webhook token")));
        }
    }

    let payload = WebhookPayload::parse(content_type.as_deref(), &body).map_err(|err| {
        warn!(error = %err, bytes = body.len(), "unparseable webhook");
        reject(ApiError::bad_request(err.to_string()))
    })?;

    info!(
        action = %payload.action,
        appointment_id = ?payload.appointment_id,
        "webhook received"
    );
    let appointment_id = payload.appointment_id;
    state
        .bus
        .emit(Event::WebhookReceived {
            payload,
            received_at: Utc::now(),
        })
        .await;

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "received": true, "appointment_id": appointment_id })),
        StatusCode::OK,
    )
    .into_response())
}

// Constant-time comparison so response timing does not leak the token.
fn token_matches(given: &str, expected: &str) -> bool {
    let (a, b) = (given.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_comparison() {
        assert!(token_matches("s3cret", "s3cret"));
        assert!(!token_matches("s3creT", "s3cret"));
        assert!(!token_matches("s3cre", "s3cret"));
        assert!(!token_matches("", "s3cret"));
    }
}
