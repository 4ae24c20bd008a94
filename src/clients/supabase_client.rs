use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error_message;
use crate::models::session::{Session, SessionDraft, string_or_number};
use crate::service::auth::{AuthError, AuthProvider, AuthUser};
use crate::service::session_store::{SessionStore, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const RETURN_ROWS: &str = "return=representation";
const UPSERT_ROWS: &str = "resolution=merge-duplicates,return=representation";

/// Client for the hosted database (PostgREST) and its auth service.
///
/// The sessions table needs a unique constraint on `appointment_id` for the
/// upsert to merge instead of insert.
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
    sessions_table: String,
    profiles_table: String,
}

#[derive(Serialize)]
struct SessionRow<'a> {
    #[serde(flatten)]
    draft: &'a SessionDraft,
    updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ProfileRow {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
}

#[derive(Deserialize)]
struct AuthUserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl SupabaseClient {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            sessions_table: "sessions".to_string(),
            profiles_table: "profiles".to_string(),
        })
    }

    pub fn with_tables(mut self, sessions: impl Into<String>, profiles: impl Into<String>) -> Self {
        self.sessions_table = sessions.into();
        self.profiles_table = profiles.into();
        self
    }

    fn rest(&self, method: Method, table: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/{}", self.base_url, table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn rows<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Vec<T>, StoreError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(StoreError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        serde_json::from_str(&text).map_err(|e| StoreError::Decode(format!("{e}; body: {text}")))
    }
}

#[async_trait]
impl SessionStore for SupabaseClient {
    async fn find_by_appointment(&self, appointment_id: u64) -> Result<Option<Session>, StoreError> {
        let request = self.rest(Method::GET, &self.sessions_table).query(&[
            ("select", "*".to_string()),
            ("appointment_id", format!("eq.{appointment_id}")),
            ("limit", "1".to_string()),
        ]);
        let mut rows: Vec<Session> = self.rows(request).await?;
        Ok(rows.pop())
    }

    async fn find_by_email(&self, email: &str) -> Result<Vec<Session>, StoreError> {
        let request = self.rest(Method::GET, &self.sessions_table).query(&[
            ("select", "*".to_string()),
            ("client_email", format!("eq.{}", email.to_ascii_lowercase())),
            ("order", "starts_at.asc".to_string()),
        ]);
        self.rows(request).await
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        let request = self.rest(Method::GET, &self.sessions_table).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "starts_at.asc".to_string()),
        ]);
        self.rows(request).await
    }

    async fn upsert_by_appointment(&self, draft: &SessionDraft) -> Result<Session, StoreError> {
        debug!(appointment_id = ?draft.appointment_id, "upserting session");
        let row = SessionRow {
            draft,
            updated_at: Utc::now(),
        };
        let request = self
            .rest(Method::POST, &self.sessions_table)
            .query(&[("on_conflict", "appointment_id")])
            .header("Prefer", UPSERT_ROWS)
            .json(&[row]);
        let mut rows: Vec<Session> = self.rows(request).await?;
        rows.pop()
            .ok_or_else(|| StoreError::Decode("upsert returned no rows".to_string()))
    }

    async fn update(&self, id: &str, draft: &SessionDraft) -> Result<Session, StoreError> {
        debug!(session_id = id, "updating session");
        let row = SessionRow {
            draft,
            updated_at: Utc::now(),
        };
        let request = self
            .rest(Method::PATCH, &self.sessions_table)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", RETURN_ROWS)
            .json(&row);
        let mut rows: Vec<Session> = self.rows(request).await?;
        rows.pop().ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn user_id_for_email(&self, email: &str) -> Result<Option<String>, StoreError> {
        let request = self.rest(Method::GET, &self.profiles_table).query(&[
            ("select", "id".to_string()),
            ("email", format!("eq.{}", email.to_ascii_lowercase())),
            ("limit", "1".to_string()),
        ]);
        let mut rows: Vec<ProfileRow> = self.rows(request).await?;
        Ok(rows.pop().map(|row| row.id))
    }
}

#[async_trait]
impl AuthProvider for SupabaseClient {
    async fn user_from_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::Backend(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(AuthError::InvalidToken),
            status if !status.is_success() => {
                let text = response.text().await.unwrap_or_default();
                return Err(AuthError::Backend(format!("{status}: {}", error_message(&text))));
            }
            _ => {}
        }

        let user: AuthUserResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Backend(e.to_string()))?;
        let email = user
            .email
            .map(|e| e.trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .ok_or(AuthError::NoEmail)?;
        Ok(AuthUser { id: user.id, email })
    }
}
