use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("token rejected by auth backend")]
    InvalidToken,
    #[error("auth user has no email")]
    NoEmail,
    #[error("auth backend unavailable: {0}")]
    Backend(String),
}

/// Resolves an access token to the signed-in user. Token issuance and
/// validation belong to the hosted backend.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn user_from_token(&self, token: &str) -> Result<AuthUser, AuthError>;
}

/// Strips the `Bearer ` scheme from an Authorization header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.map(str::trim).ok_or(AuthError::MissingToken)?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or(AuthError::MissingToken)?;
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}
