use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Directory the local session store persists to when `DB_LOCATION` is unset.
pub const DEFAULT_DB_LOCATION: &str = "./data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Scheduled,
    Rescheduled,
    Canceled,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Rescheduled => "rescheduled",
            SessionStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// A booked field session as stored in the hosted database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub client_email: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<u64>,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timezone: Option<String>,
    pub status: SessionStatus,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub session_type: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Session data derived from an appointment, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDraft {
    pub user_id: Option<String>,
    pub client_email: String,
    pub client_name: Option<String>,
    pub appointment_id: Option<u64>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub status: SessionStatus,
    pub field: Option<String>,
    pub session_type: Option<String>,
    pub notes: Option<String>,
}

impl SessionDraft {
    /// Fills attributes the incoming data lacks from the stored row.
    /// A linked user is never unlinked by a later, less complete update.
    pub fn carry_over(mut self, existing: &Session) -> Self {
        if self.user_id.is_none() {
            self.user_id = existing.user_id.clone();
        }
        if self.client_name.is_none() {
            self.client_name = existing.client_name.clone();
        }
        if self.appointment_id.is_none() {
            self.appointment_id = existing.appointment_id;
        }
        if self.ends_at.is_none() {
            // Keep the stored length so a moved start does not end before it begins.
            self.ends_at = existing
                .ends_at
                .map(|ends_at| self.starts_at + (ends_at - existing.starts_at));
        }
        if self.field.is_none() {
            self.field = existing.field.clone();
        }
        if self.session_type.is_none() {
            self.session_type = existing.session_type.clone();
        }
        if self.notes.is_none() {
            self.notes = existing.notes.clone();
        }
        self
    }

    pub fn into_session(self, id: String, updated_at: DateTime<Utc>) -> Session {
        Session {
            id,
            user_id: self.user_id,
            client_email: self.client_email,
            client_name: self.client_name,
            appointment_id: self.appointment_id,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            timezone: self.timezone,
            status: self.status,
            field: self.field,
            session_type: self.session_type,
            notes: self.notes,
            updated_at: Some(updated_at),
        }
    }
}

impl From<&Session> for SessionDraft {
    fn from(session: &Session) -> Self {
        SessionDraft {
            user_id: session.user_id.clone(),
            client_email: session.client_email.clone(),
            client_name: session.client_name.clone(),
            appointment_id: session.appointment_id,
            starts_at: session.starts_at,
            ends_at: session.ends_at,
            timezone: session.timezone.clone(),
            status: session.status,
            field: session.field.clone(),
            session_type: session.session_type.clone(),
            notes: session.notes.clone(),
        }
    }
}

impl Session {
    pub fn differs_from(&self, draft: &SessionDraft) -> bool {
        self.user_id != draft.user_id
            || self.client_email != draft.client_email
            || self.client_name != draft.client_name
            || self.appointment_id != draft.appointment_id
            || self.starts_at != draft.starts_at
            || self.ends_at != draft.ends_at
            || self.timezone != draft.timezone
            || self.status != draft.status
            || self.field != draft.field
            || self.session_type != draft.session_type
            || self.notes != draft.notes
    }

    pub fn is_owned_by(&self, user_id: &str, email: &str) -> bool {
        self.user_id.as_deref() == Some(user_id) || self.client_email.eq_ignore_ascii_case(email)
    }
}

// Row ids come back as bigint or uuid depending on the table definition.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unexpected id value {other}"))),
    }
}
