use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error_message;
use crate::models::appointment::{
    Appointment, AvailableDate, AvailableTime, CancelRequest, NewAppointment, RescheduleRequest,
};
use crate::service::scheduling::{SchedulerError, SchedulingClient};

pub const DEFAULT_BASE_URL: &str = "https://acuityscheduling.com/api/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LIST_LIMIT: u32 = 500;

/// HTTP client for the scheduling provider's v1 REST API.
pub struct AcuityClient {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
    api_key: String,
    calendar_id: Option<u64>,
}

impl AcuityClient {
    pub fn new(
        base_url: impl Into<String>,
        user_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, SchedulerError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
            api_key: api_key.into(),
            calendar_id: None,
        })
    }

    /// Restricts availability lookups to one calendar (one field).
    pub fn with_calendar_id(mut self, calendar_id: Option<u64>) -> Self {
        self.calendar_id = calendar_id;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        self.http
            .request(method, url)
            .basic_auth(&self.user_id, Some(&self.api_key))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SchedulerError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?; // read the body once

        if !status.is_success() {
            return Err(SchedulerError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        serde_json::from_str(&text).map_err(|e| SchedulerError::Decode(format!("{e}; body: {text}")))
    }

    fn calendar_query(&self) -> Vec<(&'static str, String)> {
        self.calendar_id
            .map(|id| vec![("calendarID", id.to_string())])
            .unwrap_or_default()
    }
}

#[async_trait]
impl SchedulingClient for AcuityClient {
    async fn available_dates(
        &self,
        month: &str,
        appointment_type_id: u64,
    ) -> Result<Vec<AvailableDate>, SchedulerError> {
        debug!(month, appointment_type_id, "fetching available dates");
        let request = self
            .request(Method::GET, "availability/dates")
            .query(&[
                ("month", month.to_string()),
                ("appointmentTypeID", appointment_type_id.to_string()),
            ])
            .query(&self.calendar_query());
        self.send(request).await
    }

    async fn available_times(
        &self,
        date: NaiveDate,
        appointment_type_id: u64,
    ) -> Result<Vec<AvailableTime>, SchedulerError> {
        debug!(%date, appointment_type_id, "fetching available times");
        let request = self
            .request(Method::GET, "availability/times")
            .query(&[
                ("date", date.format("%Y-%m-%d").to_string()),
                ("appointmentTypeID", appointment_type_id.to_string()),
            ])
            .query(&self.calendar_query());
        self.send(request).await
    }

    async fn get_appointment(&self, id: u64) -> Result<Appointment, SchedulerError> {
        debug!(appointment_id = id, "fetching appointment");
        let request = self.request(Method::GET, &format!("appointments/{id}"));
        match self.send::<Appointment>(request).await {
            Err(SchedulerError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(SchedulerError::NotFound(id))
            }
            other => other,
        }
    }

    async fn list_appointments(
        &self,
        min_date: NaiveDate,
        max_date: NaiveDate,
    ) -> Result<Vec<Appointment>, SchedulerError> {
        debug!(%min_date, %max_date, "listing appointments");
        // Canceled appointments are only listed with `showall`.
        let request = self.request(Method::GET, "appointments").query(&[
            ("minDate", min_date.format("%Y-%m-%d").to_string()),
            ("maxDate", max_date.format("%Y-%m-%d").to_string()),
            ("max", LIST_LIMIT.to_string()),
            ("showall", "true".to_string()),
        ]);
        let appointments: Vec<Appointment> = self.send(request).await?;
        if appointments.len() >= LIST_LIMIT as usize {
            warn!(
                %min_date,
                %max_date,
                limit = LIST_LIMIT,
                "appointment listing hit the page limit, later appointments were not returned"
            );
        }
        Ok(appointments)
    }

    async fn create_appointment(
        &self,
        appointment: &NewAppointment,
    ) -> Result<Appointment, SchedulerError> {
        debug!(datetime = %appointment.datetime, "creating appointment");
        let request = self.request(Method::POST, "appointments").json(appointment);
        self.send(request).await
    }

    async fn reschedule_appointment(
        &self,
        id: u64,
        datetime: &str,
    ) -> Result<Appointment, SchedulerError> {
        debug!(appointment_id = id, datetime, "rescheduling appointment");
        let body = RescheduleRequest {
            datetime: datetime.to_string(),
        };
        let request = self
            .request(Method::PUT, &format!("appointments/{id}/reschedule"))
            .json(&body);
        self.send(request).await
    }

    async fn cancel_appointment(
        &self,
        id: u64,
        note: Option<&str>,
    ) -> Result<Appointment, SchedulerError> {
        debug!(appointment_id = id, "canceling appointment");
        let body = CancelRequest {
            cancel_note: note.map(str::to_string),
        };
        let request = self
            .request(Method::PUT, &format!("appointments/{id}/cancel"))
            .json(&body);
        self.send(request).await
    }
}
