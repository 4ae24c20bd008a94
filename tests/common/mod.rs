#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use fieldBooking::models::appointment::{Appointment, AvailableDate, AvailableTime, NewAppointment};
use fieldBooking::service::scheduling::{SchedulerError, SchedulingClient};
use tokio::sync::Mutex;

/// In-memory stand-in for the scheduling provider.
pub struct FakeScheduler {
    pub appointments: Mutex<HashMap<u64, Appointment>>,
    pub unreachable: AtomicBool,
    pub reject_with: Mutex<Option<(u16, String)>>,
    pub created: Mutex<Vec<NewAppointment>>,
    next_id: AtomicU64,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self {
            appointments: Mutex::new(HashMap::new()),
            unreachable: AtomicBool::new(false),
            reject_with: Mutex::new(None),
            created: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(5000),
        }
    }

    pub async fn insert(&self, appointment: Appointment) {
        self.appointments.lock().await.insert(appointment.id, appointment);
    }

    pub fn set_unreachable(&self, down: bool) {
        self.unreachable.store(down, Ordering::SeqCst);
    }

    async fn check(&self) -> Result<(), SchedulerError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SchedulerError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        if let Some((status, message)) = self.reject_with.lock().await.clone() {
            return Err(SchedulerError::Api { status, message });
        }
        Ok(())
    }
}

#[async_trait]
impl SchedulingClient for FakeScheduler {
    async fn available_dates(
        &self,
        month: &str,
        _appointment_type_id: u64,
    ) -> Result<Vec<AvailableDate>, SchedulerError> {
        self.check().await?;
        Ok(vec![
            AvailableDate {
                date: format!("{month}-17"),
            },
            AvailableDate {
                date: format!("{month}-18"),
            },
        ])
    }

    async fn available_times(
        &self,
        date: NaiveDate,
        _appointment_type_id: u64,
    ) -> Result<Vec<AvailableTime>, SchedulerError> {
        self.check().await?;
        Ok(vec![AvailableTime {
            time: format!("{}T10:15:00-0400", date.format("%Y-%m-%d")),
            slots_available: Some(1),
        }])
    }

    async fn get_appointment(&self, id: u64) -> Result<Appointment, SchedulerError> {
        self.check().await?;
        self.appointments
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(SchedulerError::NotFound(id))
    }

    async fn list_appointments(
        &self,
        _min_date: NaiveDate,
        _max_date: NaiveDate,
    ) -> Result<Vec<Appointment>, SchedulerError> {
        self.check().await?;
        let mut all: Vec<Appointment> = self.appointments.lock().await.values().cloned().collect();
        all.sort_by_key(|a| a.id);
        Ok(all)
    }

    async fn create_appointment(&self, new: &NewAppointment) -> Result<Appointment, SchedulerError> {
        self.check().await?;
        self.created.lock().await.push(new.clone());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let appointment = Appointment {
            id,
            first_name: Some(new.first_name.clone()),
            last_name: Some(new.last_name.clone()),
            email: Some(new.email.clone()),
            phone: new.phone.clone(),
            datetime: Some(new.datetime.clone()),
            duration: Some(60),
            appointment_type: Some("Solo Session".to_string()),
            appointment_type_id: Some(new.appointment_type_id),
            calendar: Some("Main Field".to_string()),
            calendar_id: new.calendar_id,
            notes: new.notes.clone(),
            ..Appointment::default()
        };
        self.insert(appointment.clone()).await;
        Ok(appointment)
    }

    async fn reschedule_appointment(&self, id: u64, datetime: &str) -> Result<Appointment, SchedulerError> {
        self.check().await?;
        let mut appointments = self.appointments.lock().await;
        let appointment = appointments.get_mut(&id).ok_or(SchedulerError::NotFound(id))?;
        appointment.datetime = Some(datetime.to_string());
        Ok(appointment.clone())
    }

    async fn cancel_appointment(&self, id: u64, note: Option<&str>) -> Result<Appointment, SchedulerError> {
        self.check().await?;
        let mut appointments = self.appointments.lock().await;
        let appointment = appointments.get_mut(&id).ok_or(SchedulerError::NotFound(id))?;
        appointment.canceled = true;
        if let Some(note) = note {
            appointment.notes = Some(note.to_string());
        }
        Ok(appointment.clone())
    }
}

/// A typical appointment as the provider returns it: compact offset,
/// duration in minutes, mixed-case email.
pub fn appointment(id: u64) -> Appointment {
    Appointment {
        id,
        first_name: Some("Ada".to_string()),
        last_name: Some("Lovelace".to_string()),
        email: Some("Ada@Example.com".to_string()),
        date: Some("June 17, 2026".to_string()),
        time: Some("10:15am".to_string()),
        end_time: Some("11:15am".to_string()),
        datetime: Some("2026-06-17T10:15:00-0400".to_string()),
        timezone: Some("America/New_York".to_string()),
        duration: Some(60),
        appointment_type: Some("Solo Session".to_string()),
        appointment_type_id: Some(777),
        calendar: Some("Main Field".to_string()),
        calendar_id: Some(42),
        ..Appointment::default()
    }
}

pub fn form_body(action: &str, id: u64) -> Vec<u8> {
    format!("action={action}&id={id}&calendarID=42&appointmentTypeID=777").into_bytes()
}
