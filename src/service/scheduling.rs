use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::appointment::{Appointment, AvailableDate, AvailableTime, NewAppointment};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("scheduler returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("appointment {0} not found")]
    NotFound(u64),
    #[error("unexpected scheduler response: {0}")]
    Decode(String),
}

impl SchedulerError {
    /// True when the provider refused the request itself (bad slot, bad
    /// email), as opposed to being unreachable.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SchedulerError::Api { status, .. } if (400..500).contains(status))
    }
}

/// The external appointment scheduler. Slot computation, conflict checks and
/// client notifications all happen on the provider's side.
#[async_trait]
pub trait SchedulingClient: Send + Sync {
    /// Dates in `month` ("YYYY-MM") with at least one open slot.
    async fn available_dates(
        &self,
        month: &str,
        appointment_type_id: u64,
    ) -> Result<Vec<AvailableDate>, SchedulerError>;

    async fn available_times(
        &self,
        date: NaiveDate,
        appointment_type_id: u64,
    ) -> Result<Vec<AvailableTime>, SchedulerError>;

    async fn get_appointment(&self, id: u64) -> Result<Appointment, SchedulerError>;

    /// Appointments starting between the two dates, inclusive.
    async fn list_appointments(
        &self,
        min_date: NaiveDate,
        max_date: NaiveDate,
    ) -> Result<Vec<Appointment>, SchedulerError>;

    async fn create_appointment(
        &self,
        appointment: &NewAppointment,
    ) -> Result<Appointment, SchedulerError>;

    /// `datetime` is already in the provider's format.
    async fn reschedule_appointment(
        &self,
        id: u64,
        datetime: &str,
    ) -> Result<Appointment, SchedulerError>;

    async fn cancel_appointment(
        &self,
        id: u64,
        note: Option<&str>,
    ) -> Result<Appointment, SchedulerError>;
}
