//! Appointment-to-session reconciliation.
//!
//! Every path that learns about an appointment (webhooks, the booking API,
//! the periodic resync) funnels through [`Reconciler`], which turns the
//! provider's record into a [`SessionDraft`] and writes it with
//! last-write-wins semantics. Running it twice on the same data is a no-op.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::appointment::Appointment;
use crate::models::session::{Session, SessionDraft, SessionStatus};
use crate::models::webhook::{WebhookAction, WebhookPayload};
use crate::service::datetime::{self, combine_date_time, normalize_datetime, resolve_timezone};
use crate::service::email::extract_email;
use crate::service::scheduling::{SchedulerError, SchedulingClient};
use crate::service::session_store::{SessionStore, StoreError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingAppointmentId,
    NotAnAppointment,
    NoEmail,
    NoStartTime,
    UnknownCanceled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::MissingAppointmentId => "no appointment id and not enough payload data",
            SkipReason::NotAnAppointment => "event does not concern an appointment",
            SkipReason::NoEmail => "no client email found",
            SkipReason::NoStartTime => "no parseable start time",
            SkipReason::UnknownCanceled => "cancellation for an appointment never stored",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Created(Session),
    Updated(Session),
    Unchanged(Session),
    Skipped(SkipReason),
}

impl ReconcileOutcome {
    pub fn session(&self) -> Option<&Session> {
        match self {
            ReconcileOutcome::Created(s)
            | ReconcileOutcome::Updated(s)
            | ReconcileOutcome::Unchanged(s) => Some(s),
            ReconcileOutcome::Skipped(_) => None,
        }
    }

    pub fn into_session(self) -> Option<Session> {
        match self {
            ReconcileOutcome::Created(s)
            | ReconcileOutcome::Updated(s)
            | ReconcileOutcome::Unchanged(s) => Some(s),
            ReconcileOutcome::Skipped(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Created(_) => "created",
            ReconcileOutcome::Updated(_) => "updated",
            ReconcileOutcome::Unchanged(_) => "unchanged",
            ReconcileOutcome::Skipped(_) => "skipped",
        }
    }
}

pub struct Reconciler {
    scheduler: Arc<dyn SchedulingClient>,
    store: Arc<dyn SessionStore>,
    timezone: Tz,
}

impl Reconciler {
    pub fn new(scheduler: Arc<dyn SchedulingClient>, store: Arc<dyn SessionStore>, timezone: Tz) -> Self {
        Self {
            scheduler,
            store,
            timezone,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub async fn reconcile_webhook(
        &self,
        payload: &WebhookPayload,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(appointment_id) = payload.appointment_id else {
            if payload.action == WebhookAction::OrderCompleted {
                return Ok(ReconcileOutcome::Skipped(SkipReason::NotAnAppointment));
            }
            let flat = Appointment::from_flat_fields(0, &payload.fields);
            if !self.has_enough_data(&flat, &payload.fields) {
                return Ok(ReconcileOutcome::Skipped(SkipReason::MissingAppointmentId));
            }
            debug!(action = %payload.action, "reconciling webhook without appointment id from payload");
            return self
                .reconcile_inner(&flat, None, &payload.action, &payload.fields)
                .await;
        };

        match self.scheduler.get_appointment(appointment_id).await {
            Ok(appointment) => {
                self.reconcile_appointment(&appointment, &payload.action, &payload.fields)
                    .await
            }
            Err(err) => {
                let flat = Appointment::from_flat_fields(appointment_id, &payload.fields);
                if self.has_enough_data(&flat, &payload.fields) {
                    warn!(
                        appointment_id,
                        error = %err,
                        "scheduler lookup failed, reconciling from webhook payload"
                    );
                    return self
                        .reconcile_appointment(&flat, &payload.action, &payload.fields)
                        .await;
                }
                if payload.action == WebhookAction::Canceled {
                    if let Some(outcome) = self.cancel_locally(appointment_id).await? {
                        warn!(
                            appointment_id,
                            error = %err,
                            "scheduler lookup failed, canceled stored session"
                        );
                        return Ok(outcome);
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Reconciles a full appointment record. `fields` are extra flat values
    /// (usually the webhook payload) consulted for the client email.
    pub async fn reconcile_appointment(
        &self,
        appointment: &Appointment,
        action: &WebhookAction,
        fields: &HashMap<String, String>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconcile_inner(appointment, Some(appointment.id), action, fields)
            .await
    }

    async fn reconcile_inner(
        &self,
        appointment: &Appointment,
        appointment_id: Option<u64>,
        action: &WebhookAction,
        fields: &HashMap<String, String>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(email) = extract_email(fields, Some(appointment)) else {
            return Ok(ReconcileOutcome::Skipped(SkipReason::NoEmail));
        };
        let tz = resolve_timezone(appointment.timezone.as_deref(), self.timezone);
        let Some(starts_at) = start_of(appointment, tz) else {
            return Ok(ReconcileOutcome::Skipped(SkipReason::NoStartTime));
        };
        let ends_at = end_of(appointment, starts_at, tz);

        let existing = match appointment_id {
            Some(id) => self.store.find_by_appointment(id).await?,
            None => None,
        };
        let existing = match existing {
            Some(session) => Some(session),
            None => self.adoptable(&email, starts_at, appointment_id.is_none()).await?,
        };

        let canceled = appointment.canceled || *action == WebhookAction::Canceled;
        if canceled && existing.is_none() {
            return Ok(ReconcileOutcome::Skipped(SkipReason::UnknownCanceled));
        }

        let status = derive_status(canceled, action, existing.as_ref(), starts_at);
        let draft = SessionDraft {
            user_id: self.lookup_user(&email).await,
            client_email: email,
            client_name: appointment.client_name(),
            appointment_id,
            starts_at,
            ends_at,
            timezone: Some(tz.name().to_string()),
            status,
            field: non_blank(appointment.calendar.as_deref()),
            session_type: non_blank(appointment.appointment_type.as_deref()),
            notes: non_blank(appointment.notes.as_deref()),
        };

        match existing {
            Some(session) => {
                let draft = draft.carry_over(&session);
                if !session.differs_from(&draft) {
                    return Ok(ReconcileOutcome::Unchanged(session));
                }
                let updated = self.store.update(&session.id, &draft).await?;
                Ok(ReconcileOutcome::Updated(updated))
            }
            None => {
                let created = self.store.upsert_by_appointment(&draft).await?;
                Ok(ReconcileOutcome::Created(created))
            }
        }
    }

    // A row with the same client and start that has not been linked to an
    // appointment yet (manually entered, or imported before ids were kept).
    async fn adoptable(
        &self,
        email: &str,
        starts_at: DateTime<Utc>,
        any_appointment: bool,
    ) -> Result<Option<Session>, StoreError> {
        let sessions = self.store.find_by_email(email).await?;
        Ok(sessions
            .into_iter()
            .find(|s| s.starts_at == starts_at && (any_appointment || s.appointment_id.is_none())))
    }

    async fn cancel_locally(&self, appointment_id: u64) -> Result<Option<ReconcileOutcome>, StoreError> {
        let Some(session) = self.store.find_by_appointment(appointment_id).await? else {
            return Ok(None);
        };
        if session.status == SessionStatus::Canceled {
            return Ok(Some(ReconcileOutcome::Unchanged(session)));
        }
        let mut draft = SessionDraft::from(&session);
        draft.status = SessionStatus::Canceled;
        let updated = self.store.update(&session.id, &draft).await?;
        Ok(Some(ReconcileOutcome::Updated(updated)))
    }

    async fn lookup_user(&self, email: &str) -> Option<String> {
        match self.store.user_id_for_email(email).await {
            Ok(user_id) => user_id,
            Err(err) => {
                warn!(error = %err, "profile lookup failed, leaving session unlinked");
                None
            }
        }
    }

    fn has_enough_data(&self, appointment: &Appointment, fields: &HashMap<String, String>) -> bool {
        let tz = resolve_timezone(appointment.timezone.as_deref(), self.timezone);
        extract_email(fields, Some(appointment)).is_some() && start_of(appointment, tz).is_some()
    }
}

fn derive_status(
    canceled: bool,
    action: &WebhookAction,
    existing: Option<&Session>,
    starts_at: DateTime<Utc>,
) -> SessionStatus {
    if canceled {
        return SessionStatus::Canceled;
    }
    match action {
        WebhookAction::Scheduled => SessionStatus::Scheduled,
        WebhookAction::Rescheduled => SessionStatus::Rescheduled,
        _ => match existing {
            Some(s) if s.starts_at != starts_at => SessionStatus::Rescheduled,
            Some(s) if s.status != SessionStatus::Canceled => s.status,
            _ => SessionStatus::Scheduled,
        },
    }
}

fn start_of(appointment: &Appointment, tz: Tz) -> Option<DateTime<Utc>> {
    if let Some(raw) = appointment.datetime.as_deref() {
        match normalize_datetime(raw, tz) {
            Ok(dt) => return Some(dt),
            Err(err) => debug!(appointment_id = appointment.id, error = %err, "datetime unusable"),
        }
    }
    let (Some(date), Some(time)) = (appointment.date.as_deref(), appointment.time.as_deref()) else {
        return None;
    };
    match combine_date_time(date, time, tz) {
        Ok(dt) => Some(dt),
        Err(err) => {
            debug!(appointment_id = appointment.id, error = %err, "date/time pair unusable");
            None
        }
    }
}

fn end_of(appointment: &Appointment, starts_at: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    if let Some(minutes) = appointment.duration.filter(|m| *m > 0) {
        return Some(starts_at + Duration::minutes(i64::from(minutes)));
    }
    let clock = datetime::parse_clock(appointment.end_time.as_deref()?).ok()?;
    let local_day = starts_at.with_timezone(&tz).date_naive();
    let mut ends_at = datetime::localize(local_day.and_time(clock), tz);
    if ends_at <= starts_at {
        ends_at += Duration::days(1);
    }
    Some(ends_at)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
