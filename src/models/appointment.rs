use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// An appointment as the scheduling provider returns it.
///
/// Only `id` is guaranteed. Everything else is optional because the provider
/// omits empty fields and webhook-only payloads carry a subset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: u64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Human date, e.g. "June 17, 2026".
    #[serde(default)]
    pub date: Option<String>,
    /// Human start time, e.g. "10:15am".
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    /// ISO-8601 start, usually with a compact offset ("2026-06-17T10:15:00-0400").
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default, deserialize_with = "lenient_minutes")]
    pub duration: Option<u32>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default, rename = "type")]
    pub appointment_type: Option<String>,
    #[serde(default, rename = "appointmentTypeID")]
    pub appointment_type_id: Option<u64>,
    #[serde(default)]
    pub calendar: Option<String>,
    #[serde(default, rename = "calendarID")]
    pub calendar_id: Option<u64>,
    #[serde(default)]
    pub canceled: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub forms: Vec<IntakeForm>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntakeForm {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub values: Vec<IntakeValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeValue {
    #[serde(default, rename = "fieldID")]
    pub field_id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

const EMAIL_KEYS: &[&str] = &[
    "email",
    "client_email",
    "clientEmail",
    "customer_email",
    "customer[email]",
    "appointment[email]",
];
const DATETIME_KEYS: &[&str] = &[
    "datetime",
    "start_time",
    "startTime",
    "start",
    "appointment[datetime]",
];
const FIRST_NAME_KEYS: &[&str] = &["firstName", "first_name", "appointment[firstName]"];
const LAST_NAME_KEYS: &[&str] = &["lastName", "last_name", "appointment[lastName]"];

impl Appointment {
    /// Builds an appointment from a flat webhook field map.
    ///
    /// Each attribute walks a chain of known spellings and takes the first
    /// non-empty one.
    pub fn from_flat_fields(id: u64, fields: &HashMap<String, String>) -> Self {
        Appointment {
            id,
            first_name: first_present(fields, FIRST_NAME_KEYS),
            last_name: first_present(fields, LAST_NAME_KEYS),
            email: first_present(fields, EMAIL_KEYS),
            phone: first_present(fields, &["phone", "appointment[phone]"]),
            date: first_present(fields, &["date", "appointment[date]"]),
            time: first_present(fields, &["time", "appointment[time]"]),
            end_time: first_present(fields, &["endTime", "end_time", "appointment[endTime]"]),
            datetime: first_present(fields, DATETIME_KEYS),
            timezone: first_present(fields, &["timezone", "appointment[timezone]"]),
            duration: first_present(fields, &["duration", "appointment[duration]"])
                .and_then(|v| v.trim().parse().ok()),
            price: first_present(fields, &["price", "appointment[price]"]),
            appointment_type: first_present(fields, &["type", "appointmentType"]),
            appointment_type_id: first_present(
                fields,
                &["appointmentTypeID", "appointment_type_id", "appointmentTypeId"],
            )
            .and_then(|v| v.trim().parse().ok()),
            calendar: first_present(fields, &["calendar", "appointment[calendar]"]),
            calendar_id: first_present(fields, &["calendarID", "calendar_id", "calendarId"])
                .and_then(|v| v.trim().parse().ok()),
            canceled: first_present(fields, &["canceled", "cancelled"])
                .map(|v| matches!(v.trim(), "true" | "1" | "yes"))
                .unwrap_or(false),
            notes: first_present(fields, &["notes", "appointment[notes]"]),
            forms: Vec::new(),
        }
    }

    pub fn client_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// Iterates (field name, value) over every intake form answer.
    pub fn form_values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.forms.iter().flat_map(|form| {
            form.values.iter().filter_map(|v| {
                let value = v.value.as_deref()?;
                Some((v.name.as_deref().unwrap_or(""), value))
            })
        })
    }
}

/// First non-blank value among `keys`, in order.
pub fn first_present(fields: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| fields.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn lenient_minutes<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableDate {
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTime {
    pub time: String,
    #[serde(default)]
    pub slots_available: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    pub datetime: String,
    #[serde(rename = "appointmentTypeID")]
    pub appointment_type_id: u64,
    #[serde(rename = "calendarID", skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<u64>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RescheduleRequest {
    pub datetime: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_provider_json_with_string_duration() {
        let body = r#"{
            "id": 912,
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": "ada@example.com",
            "date": "June 17, 2026",
            "time": "10:15am",
            "endTime": "11:15am",
            "datetime": "2026-06-17T10:15:00-0400",
            "timezone": "America/New_York",
            "duration": "60",
            "type": "Private field - 1 hour",
            "appointmentTypeID": 7,
            "calendar": "North Field",
            "calendarID": 3,
            "canceled": false,
            "forms": [{"id": 1, "name": "Dogs", "values": [{"fieldID": 5, "name": "Dog names", "value": "Rex"}]}]
        }"#;
        let appt: Appointment = serde_json::from_str(body).unwrap();
        assert_eq!(appt.id, 912);
        assert_eq!(appt.duration, Some(60));
        assert_eq!(appt.appointment_type.as_deref(), Some("Private field - 1 hour"));
        assert_eq!(appt.calendar_id, Some(3));
        assert_eq!(appt.client_name().as_deref(), Some("Ada Lovelace"));
        assert_eq!(appt.form_values().next(), Some(("Dog names", "Rex")));
    }

    #[test]
    fn missing_fields_default() {
        let appt: Appointment = serde_json::from_str(r#"{"id": 1, "duration": null}"#).unwrap();
        assert_eq!(appt.duration, None);
        assert!(!appt.canceled);
        assert!(appt.client_name().is_none());
    }

    #[test]
    fn from_flat_fields_walks_fallback_keys() {
        let fields: HashMap<String, String> = [
            ("clientEmail", "  Sam@Example.com "),
            ("start_time", "2026-06-17T10:15:00-0400"),
            ("first_name", "Sam"),
            ("duration", "45"),
            ("cancelled", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let appt = Appointment::from_flat_fields(44, &fields);
        assert_eq!(appt.id, 44);
        assert_eq!(appt.email.as_deref(), Some("Sam@Example.com"));
        assert_eq!(appt.datetime.as_deref(), Some("2026-06-17T10:15:00-0400"));
        assert_eq!(appt.duration, Some(45));
        assert!(appt.canceled);
        assert_eq!(appt.client_name().as_deref(), Some("Sam"));
    }

    #[test]
    fn new_appointment_uses_provider_key_names() {
        let req = NewAppointment {
            datetime: "2026-06-17T10:15:00-04:00".to_string(),
            appointment_type_id: 7,
            calendar_id: None,
            first_name: "Ada".to_string(),
            last_name: "L".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
            notes: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["appointmentTypeID"], 7);
        assert_eq!(json["firstName"], "Ada");
        assert!(json.get("calendarID").is_none());
        assert!(json.get("phone").is_none());
    }
}
