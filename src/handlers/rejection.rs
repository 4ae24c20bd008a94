use std::convert::Infallible;

use serde::Serialize;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::reject::Reject;
use warp::{Rejection, Reply};

use crate::service::auth::AuthError;
use crate::service::booking::BookingError;
use crate::service::scheduling::SchedulerError;
use crate::service::session_store::StoreError;

#[derive(Debug, Serialize)]
pub struct ErrorMessage {
    pub error: String,
}

/// An HTTP-facing failure: the status to answer with and a message safe to
/// show the caller.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl Reject for ApiError {}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn into_response(self) -> warp::reply::Response {
        warp::reply::with_status(
            warp::reply::json(&ErrorMessage {
                error: self.message,
            }),
            self.status,
        )
        .into_response()
    }
}

pub fn reject(err: impl Into<ApiError>) -> Rejection {
    warp::reject::custom(err.into())
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken | AuthError::InvalidToken | AuthError::NoEmail => {
                ApiError::unauthorized(err.to_string())
            }
            AuthError::Backend(_) => {
                error!(error = %err, "auth backend failure");
                ApiError::new(StatusCode::BAD_GATEWAY, "authentication is unavailable")
            }
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match &err {
            SchedulerError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, err.to_string()),
            SchedulerError::Api { message, .. } if err.is_client_error() => {
                ApiError::bad_request(message.clone())
            }
            _ => {
                error!(error = %err, "scheduler failure");
                ApiError::new(StatusCode::BAD_GATEWAY, "scheduler is unavailable")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        error!(error = %err, "session store failure");
        match err {
            StoreError::Io(_) | StoreError::Serde(_) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "session storage failed")
            }
            _ => ApiError::new(StatusCode::BAD_GATEWAY, "session storage is unavailable"),
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Invalid(_) | BookingError::AlreadyCanceled(_) => {
                ApiError::bad_request(err.to_string())
            }
            BookingError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, err.to_string()),
            BookingError::Forbidden(_) => ApiError::new(StatusCode::FORBIDDEN, err.to_string()),
            BookingError::Unreconciled(_) => {
                error!(error = %err, "booking could not be stored");
                ApiError::new(StatusCode::BAD_GATEWAY, err.to_string())
            }
            BookingError::Scheduler(inner) => inner.into(),
            BookingError::Store(inner) => inner.into(),
            BookingError::Reconcile(inner) => match inner {
                crate::service::reconcile::ReconcileError::Scheduler(e) => e.into(),
                crate::service::reconcile::ReconcileError::Store(e) => e.into(),
            },
        }
    }
}

/// Turns every rejection into a JSON `{"error": ..}` body.
pub async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    let api_error = if let Some(api) = err.find::<ApiError>() {
        ApiError::new(api.status, api.message.clone())
    } else if err.is_not_found() {
        ApiError::new(StatusCode::NOT_FOUND, "not found")
    } else if let Some(e) = err.find::<warp::body::BodyDeserializeError>() {
        ApiError::bad_request(e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        ApiError::bad_request(e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "payload too large")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
    } else {
        warn!(rejection = ?err, "unhandled rejection");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    };
    Ok(api_error.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::reconcile::SkipReason;

    #[test]
    fn booking_errors_map_to_statuses() {
        let cases = [
            (BookingError::Invalid("bad".into()), StatusCode::BAD_REQUEST),
            (BookingError::AlreadyCanceled(1), StatusCode::BAD_REQUEST),
            (BookingError::NotFound(1), StatusCode::NOT_FOUND),
            (BookingError::Forbidden(1), StatusCode::FORBIDDEN),
            (
                BookingError::Unreconciled(SkipReason::NoEmail),
                StatusCode::BAD_GATEWAY,
            ),
            (
                BookingError::Scheduler(SchedulerError::Api {
                    status: 400,
                    message: "The time is not available".into(),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                BookingError::Scheduler(SchedulerError::Api {
                    status: 503,
                    message: "down".into(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn auth_errors_are_unauthorized_unless_backend_fails() {
        assert_eq!(ApiError::from(AuthError::InvalidToken).status, StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(AuthError::NoEmail).status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(AuthError::Backend("timeout".into())).status,
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn custom_rejections_keep_their_status() {
        let response = handle_rejection(reject(ApiError::new(StatusCode::FORBIDDEN, "nope")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = handle_rejection(warp::reject::not_found()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
