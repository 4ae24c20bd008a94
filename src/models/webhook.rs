use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::models::appointment::first_present;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAction {
    Scheduled,
    Rescheduled,
    Canceled,
    Changed,
    OrderCompleted,
    Other(String),
}

impl WebhookAction {
    pub fn parse(raw: &str) -> Self {
        let lower = raw.trim().to_ascii_lowercase();
        if lower == "order.completed" {
            return WebhookAction::OrderCompleted;
        }
        let name = lower.strip_prefix("appointment.").unwrap_or(&lower);
        match name {
            "scheduled" | "created" | "booked" => WebhookAction::Scheduled,
            "rescheduled" => WebhookAction::Rescheduled,
            "canceled" | "cancelled" => WebhookAction::Canceled,
            "changed" | "updated" => WebhookAction::Changed,
            _ => WebhookAction::Other(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for WebhookAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebhookAction::Scheduled => f.write_str("appointment.scheduled"),
            WebhookAction::Rescheduled => f.write_str("appointment.rescheduled"),
            WebhookAction::Canceled => f.write_str("appointment.canceled"),
            WebhookAction::Changed => f.write_str("appointment.changed"),
            WebhookAction::OrderCompleted => f.write_str("order.completed"),
            WebhookAction::Other(raw) => f.write_str(raw),
        }
    }
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook body is empty")]
    Empty,
    #[error("webhook body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("webhook JSON body must be an object")]
    NotAnObject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookPayload {
    pub action: WebhookAction,
    pub appointment_id: Option<u64>,
    pub calendar_id: Option<u64>,
    pub appointment_type_id: Option<u64>,
    pub fields: HashMap<String, String>,
}

const ACTION_KEYS: &[&str] = &["action", "event", "event_type", "trigger"];
const APPOINTMENT_ID_KEYS: &[&str] = &[
    "appointmentID",
    "appointmentId",
    "appointment_id",
    "appointment[id]",
];
const CALENDAR_ID_KEYS: &[&str] = &["calendarID", "calendarId", "calendar_id"];
const TYPE_ID_KEYS: &[&str] = &["appointmentTypeID", "appointmentTypeId", "appointment_type_id"];

impl WebhookPayload {
    /// Parses an inbound webhook body.
    ///
    /// The scheduler posts `application/x-www-form-urlencoded`; relays and
    /// manual replays sometimes post JSON instead. JSON objects are flattened
    /// into the same bracketed key space the form encoding uses, so the
    /// field-name fallbacks work identically for both.
    pub fn parse(content_type: Option<&str>, body: &[u8]) -> Result<Self, WebhookError> {
        let is_json = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false)
            || body.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{');

        let fields = if is_json {
            let value: Value = serde_json::from_slice(body)?;
            let Value::Object(map) = value else {
                return Err(WebhookError::NotAnObject);
            };
            let mut fields = HashMap::new();
            for (key, value) in map {
                flatten_json(&key, &value, &mut fields);
            }
            fields
        } else {
            url::form_urlencoded::parse(body)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect::<HashMap<String, String>>()
        };

        if fields.is_empty() {
            return Err(WebhookError::Empty);
        }
        Ok(Self::from_fields(fields))
    }

    pub fn from_fields(fields: HashMap<String, String>) -> Self {
        // `type` doubles as the appointment type name, so it only counts
        // when it names a known action.
        let action = first_present(&fields, ACTION_KEYS)
            .map(|raw| WebhookAction::parse(&raw))
            .or_else(|| {
                first_present(&fields, &["type"])
                    .map(|raw| WebhookAction::parse(&raw))
                    .filter(|action| !matches!(action, WebhookAction::Other(_)))
            })
            .unwrap_or(WebhookAction::Changed);

        // For order events the bare `id` is the order, not an appointment.
        let appointment_id = if action == WebhookAction::OrderCompleted {
            parse_id_from(&fields, APPOINTMENT_ID_KEYS)
        } else {
            parse_id_from(&fields, &["id"]).or_else(|| parse_id_from(&fields, APPOINTMENT_ID_KEYS))
        };

        WebhookPayload {
            action,
            appointment_id,
            calendar_id: parse_id_from(&fields, CALENDAR_ID_KEYS),
            appointment_type_id: parse_id_from(&fields, TYPE_ID_KEYS),
            fields,
        }
    }
}

fn parse_id_from(fields: &HashMap<String, String>, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .filter_map(|k| fields.get(*k))
        .find_map(|raw| parse_id(raw))
}

pub fn parse_id(raw: &str) -> Option<u64> {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .parse::<u64>()
        .ok()
}

fn flatten_json(prefix: &str, value: &Value, out: &mut HashMap<String, String>) {
    match value {
        Value::Null => {}
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Bool(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        Value::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_json(&format!("{prefix}[{key}]"), nested, out);
            }
        }
        Value::Array(items) => {
            for (idx, nested) in items.iter().enumerate() {
                flatten_json(&format!("{prefix}[{idx}]"), nested, out);
            }
        }
    }
}
