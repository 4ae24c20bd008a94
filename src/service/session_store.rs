use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::session::{Session, SessionDraft};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("session store returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("session {0} not found")]
    NotFound(String),
    #[error("unexpected session store response: {0}")]
    Decode(String),
    #[error("session store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("session store serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Persistence for local sessions. The production store is the hosted
/// database; the in-memory store backs local runs and tests.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_by_appointment(&self, appointment_id: u64) -> Result<Option<Session>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Vec<Session>, StoreError>;

    /// Sessions linked to an auth user id, whatever their client email.
    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Session>, StoreError>;

    /// Inserts, or merges into the row holding the same appointment id.
    /// Must be atomic so a webhook racing a booking call cannot duplicate.
    async fn upsert_by_appointment(&self, draft: &SessionDraft) -> Result<Session, StoreError>;

    async fn update(&self, id: &str, draft: &SessionDraft) -> Result<Session, StoreError>;

    /// Auth user id of the profile registered under `email`, if any.
    async fn user_id_for_email(&self, email: &str) -> Result<Option<String>, StoreError>;
}

pub type DB = HashMap<String, Session>;

pub struct MemorySessionStore {
    sessions: Mutex<DB>,
    profiles: Mutex<HashMap<String, String>>,
    location: Option<PathBuf>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            profiles: Mutex::new(HashMap::new()),
            location: None,
        }
    }

    /// Loads `sessions.json` under `dir` if present and writes back after
    /// every change.
    pub fn persistent(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let file = dir.join("sessions.json");
        let sessions: DB = match fs::read_to_string(&file) {
            Ok(content) if !content.trim().is_empty() => serde_json::from_str(&content)?,
            Ok(_) => HashMap::new(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        debug!(path = %file.display(), count = sessions.len(), "loaded local sessions");
        Ok(Self {
            sessions: Mutex::new(sessions),
            profiles: Mutex::new(HashMap::new()),
            location: Some(file),
        })
    }

    pub async fn register_profile(&self, email: &str, user_id: &str) {
        let mut profiles = self.profiles.lock().await;
        profiles.insert(email.to_ascii_lowercase(), user_id.to_string());
    }

    pub async fn all(&self) -> Vec<Session> {
        let sessions = self.sessions.lock().await;
        sessions.values().cloned().collect()
    }

    fn save(&self, db: &DB) -> Result<(), StoreError> {
        let Some(file) = &self.location else {
            return Ok(());
        };
        let tmp = file.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(db)?)?;
        fs::rename(&tmp, file)?;
        Ok(())
    }

    // The live map only changes once the write has landed.
    fn commit(&self, db: &mut DB, session: Session) -> Result<(), StoreError> {
        let mut next = db.clone();
        next.insert(session.id.clone(), session);
        if let Err(err) = self.save(&next) {
            warn!(error = %err, "failed to persist local sessions");
            return Err(err);
        }
        *db = next;
        Ok(())
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find_by_appointment(&self, appointment_id: u64) -> Result<Option<Session>, StoreError> {
        let db = self.sessions.lock().await;
        Ok(db
            .values()
            .find(|s| s.appointment_id == Some(appointment_id))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Vec<Session>, StoreError> {
        let db = self.sessions.lock().await;
        let mut found: Vec<Session> = db
            .values()
            .filter(|s| s.client_email.eq_ignore_ascii_case(email))
            .cloned()
            .collect();
        found.sort_by_key(|s| s.starts_at);
        Ok(found)
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        let db = self.sessions.lock().await;
        let mut found: Vec<Session> = db
            .values()
            .filter(|s| s.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        found.sort_by_key(|s| s.starts_at);
        Ok(found)
    }

    async fn upsert_by_appointment(&self, draft: &SessionDraft) -> Result<Session, StoreError> {
        let mut db = self.sessions.lock().await;
        let existing_id = draft.appointment_id.and_then(|appointment_id| {
            db.values()
                .find(|s| s.appointment_id == Some(appointment_id))
                .map(|s| s.id.clone())
        });
        let id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let session = draft.clone().into_session(id, Utc::now());
        self.commit(&mut db, session.clone())?;
        Ok(session)
    }

    async fn update(&self, id: &str, draft: &SessionDraft) -> Result<Session, StoreError> {
        let mut db = self.sessions.lock().await;
        if !db.contains_key(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let session = draft.clone().into_session(id.to_string(), Utc::now());
        self.commit(&mut db, session.clone())?;
        Ok(session)
    }

    async fn user_id_for_email(&self, email: &str) -> Result<Option<String>, StoreError> {
        let profiles = self.profiles.lock().await;
        Ok(profiles.get(&email.to_ascii_lowercase()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::SessionStatus;
    use chrono::TimeZone;

    fn draft(appointment_id: Option<u64>) -> SessionDraft {
        SessionDraft {
            user_id: None,
            client_email: "ada@example.com".to_string(),
            client_name: Some("Ada".to_string()),
            appointment_id,
            starts_at: Utc.with_ymd_and_hms(2026, 6, 17, 14, 0, 0).unwrap(),
            ends_at: None,
            timezone: None,
            status: SessionStatus::Scheduled,
            field: None,
            session_type: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn upsert_merges_on_appointment_id() {
        let store = MemorySessionStore::new();
        let first = store.upsert_by_appointment(&draft(Some(5))).await.unwrap();
        let mut next = draft(Some(5));
        next.status = SessionStatus::Canceled;
        let second = store.upsert_by_appointment(&next).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.all().await.len(), 1);
        let found = store.find_by_appointment(5).await.unwrap().unwrap();
        assert_eq!(found.status, SessionStatus::Canceled);
    }

    #[tokio::test]
    async fn update_of_missing_row_fails() {
        let store = MemorySessionStore::new();
        let err = store.update("nope", &draft(None)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn persistent_store_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("fieldbooking_test_{}", Uuid::new_v4()));
        {
            let store = MemorySessionStore::persistent(&dir).unwrap();
            store.upsert_by_appointment(&draft(Some(9))).await.unwrap();
        }
        let reopened = MemorySessionStore::persistent(&dir).unwrap();
        let found = reopened.find_by_email("ADA@example.com").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].appointment_id, Some(9));
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_untouched() {
        let dir = std::env::temp_dir().join(format!("fieldbooking_test_{}", Uuid::new_v4()));
        let store = MemorySessionStore::persistent(&dir).unwrap();
        let kept = store.upsert_by_appointment(&draft(Some(3))).await.unwrap();

        // A directory in place of the data file makes the rename fail.
        fs::remove_file(dir.join("sessions.json")).unwrap();
        fs::create_dir_all(dir.join("sessions.json").join("blocker")).unwrap();

        assert!(store.upsert_by_appointment(&draft(Some(4))).await.is_err());
        let mut canceled = draft(Some(3));
        canceled.status = SessionStatus::Canceled;
        assert!(store.update(&kept.id, &canceled).await.is_err());

        let rows = store.all().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, SessionStatus::Scheduled);
        assert!(store.find_by_appointment(4).await.unwrap().is_none());
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn finds_sessions_by_linked_user() {
        let store = MemorySessionStore::new();
        let mut linked = draft(Some(6));
        linked.user_id = Some("user-1".to_string());
        linked.client_email = "ada.work@example.com".to_string();
        store.upsert_by_appointment(&linked).await.unwrap();
        store.upsert_by_appointment(&draft(Some(7))).await.unwrap();

        let found = store.find_by_user("user-1").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].appointment_id, Some(6));
        assert!(store.find_by_user("user-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn profile_lookup_is_case_insensitive() {
        let store = MemorySessionStore::new();
        store.register_profile("Ada@Example.com", "user-1").await;
        assert_eq!(
            store.user_id_for_email("ada@example.com").await.unwrap().as_deref(),
            Some("user-1")
        );
        assert_eq!(store.user_id_for_email("bob@example.com").await.unwrap(), None);
    }
}
