use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::models::appointment::{Appointment, AvailableDate, AvailableTime, NewAppointment};
use crate::models::session::{Session, SessionDraft, SessionStatus};
use crate::models::webhook::WebhookAction;
use crate::service::auth::AuthUser;
use crate::service::datetime::{format_for_scheduler, normalize_datetime};
use crate::service::reconcile::{ReconcileError, ReconcileOutcome, Reconciler, SkipReason};
use crate::service::scheduling::{SchedulerError, SchedulingClient};
use crate::service::session_store::{SessionStore, StoreError};

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("no session for appointment {0}")]
    NotFound(u64),
    #[error("appointment {0} belongs to another client")]
    Forbidden(u64),
    #[error("appointment {0} is already canceled")]
    AlreadyCanceled(u64),
    #[error("scheduler response could not be reconciled: {0}")]
    Unreconciled(SkipReason),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub datetime: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleBody {
    pub datetime: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelBody {
    #[serde(default)]
    pub note: Option<String>,
}

/// Booking operations on behalf of a signed-in user. Each write goes to the
/// scheduler first and is then reconciled locally, so the webhook that
/// follows for the same change finds nothing to do.
pub struct BookingService {
    scheduler: Arc<dyn SchedulingClient>,
    store: Arc<dyn SessionStore>,
    reconciler: Arc<Reconciler>,
    appointment_type_id: u64,
    calendar_id: Option<u64>,
}

impl BookingService {
    pub fn new(
        scheduler: Arc<dyn SchedulingClient>,
        store: Arc<dyn SessionStore>,
        reconciler: Arc<Reconciler>,
        appointment_type_id: u64,
        calendar_id: Option<u64>,
    ) -> Self {
        Self {
            scheduler,
            store,
            reconciler,
            appointment_type_id,
            calendar_id,
        }
    }

    pub async fn availability_dates(&self, month: &str) -> Result<Vec<AvailableDate>, BookingError> {
        let month = month.trim();
        if NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").is_err() {
            return Err(BookingError::Invalid(format!("month must be YYYY-MM, got {month:?}")));
        }
        Ok(self
            .scheduler
            .available_dates(month, self.appointment_type_id)
            .await?)
    }

    pub async fn availability_times(&self, date: NaiveDate) -> Result<Vec<AvailableTime>, BookingError> {
        Ok(self
            .scheduler
            .available_times(date, self.appointment_type_id)
            .await?)
    }

    pub async fn book(
        &self,
        user: &AuthUser,
        request: &BookingRequest,
        now: DateTime<Utc>,
    ) -> Result<Session, BookingError> {
        let first_name = request.first_name.trim();
        let last_name = request.last_name.trim();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(BookingError::Invalid("first and last name are required".to_string()));
        }
        let starts_at = self.future_start(&request.datetime, now)?;

        let new_appointment = NewAppointment {
            datetime: format_for_scheduler(starts_at, self.reconciler.timezone()),
            appointment_type_id: self.appointment_type_id,
            calendar_id: self.calendar_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: user.email.clone(),
            phone: request.phone.clone().filter(|p| !p.trim().is_empty()),
            notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
        };
        let appointment = self.scheduler.create_appointment(&new_appointment).await?;
        info!(appointment_id = appointment.id, user_id = %user.id, "appointment booked");

        self.settle(user, &appointment, WebhookAction::Scheduled).await
    }

    pub async fn reschedule(
        &self,
        user: &AuthUser,
        appointment_id: u64,
        datetime: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, BookingError> {
        let session = self.owned_session(user, appointment_id).await?;
        if session.status == SessionStatus::Canceled {
            return Err(BookingError::AlreadyCanceled(appointment_id));
        }
        let starts_at = self.future_start(datetime, now)?;
        let formatted = format_for_scheduler(starts_at, self.reconciler.timezone());
        let appointment = self
            .scheduler
            .reschedule_appointment(appointment_id, &formatted)
            .await?;
        info!(appointment_id, user_id = %user.id, "appointment rescheduled");

        self.settle(user, &appointment, WebhookAction::Rescheduled).await
    }

    /// Canceling an already canceled session returns it unchanged.
    pub async fn cancel(
        &self,
        user: &AuthUser,
        appointment_id: u64,
        note: Option<&str>,
    ) -> Result<Session, BookingError> {
        let session = self.owned_session(user, appointment_id).await?;
        if session.status == SessionStatus::Canceled {
            return Ok(session);
        }
        let appointment = self
            .scheduler
            .cancel_appointment(appointment_id, note)
            .await?;
        info!(appointment_id, user_id = %user.id, "appointment canceled");

        self.settle(user, &appointment, WebhookAction::Canceled).await
    }

    /// Sessions under the user's email plus any linked to their user id.
    pub async fn sessions_for(&self, user: &AuthUser) -> Result<Vec<Session>, BookingError> {
        let mut sessions = self.store.find_by_email(&user.email).await?;
        for linked in self.store.find_by_user(&user.id).await? {
            if !sessions.iter().any(|s| s.id == linked.id) {
                sessions.push(linked);
            }
        }
        sessions.sort_by_key(|s| s.starts_at);
        Ok(sessions)
    }

    async fn owned_session(&self, user: &AuthUser, appointment_id: u64) -> Result<Session, BookingError> {
        let session = self
            .store
            .find_by_appointment(appointment_id)
            .await?
            .ok_or(BookingError::NotFound(appointment_id))?;
        if !session.is_owned_by(&user.id, &user.email) {
            return Err(BookingError::Forbidden(appointment_id));
        }
        Ok(session)
    }

    fn future_start(&self, raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, BookingError> {
        let starts_at = normalize_datetime(raw, self.reconciler.timezone())
            .map_err(|err| BookingError::Invalid(err.to_string()))?;
        if starts_at <= now {
            return Err(BookingError::Invalid("start time must be in the future".to_string()));
        }
        Ok(starts_at)
    }

    // Reconcile the scheduler's answer and make sure the row is linked to the
    // user who made the change, even without a profile row for their email.
    async fn settle(
        &self,
        user: &AuthUser,
        appointment: &Appointment,
        action: WebhookAction,
    ) -> Result<Session, BookingError> {
        let outcome = self
            .reconciler
            .reconcile_appointment(appointment, &action, &HashMap::new())
            .await?;
        let session = match outcome {
            ReconcileOutcome::Skipped(reason) => return Err(BookingError::Unreconciled(reason)),
            other => other.into_session().ok_or(BookingError::NotFound(appointment.id))?,
        };
        if session.user_id.is_some() {
            return Ok(session);
        }
        let mut draft = SessionDraft::from(&session);
        draft.user_id = Some(user.id.clone());
        Ok(self.store.update(&session.id, &draft).await?)
    }
}
