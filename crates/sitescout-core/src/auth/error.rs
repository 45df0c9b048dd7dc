use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::api::ApiError;

/// Structural problems with a session token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("token must have 3 dot-separated segments, found {0}")]
    SegmentCount(usize),

    #[error("token has an empty signature segment")]
    MissingSignature,

    #[error("token header is not a JWT header: {0}")]
    Header(String),

    #[error("token claims could not be read: {0}")]
    Claims(String),

    #[error("token is missing required claim `{0}`")]
    MissingClaim(&'static str),

    #[error("token claim `exp` is not a valid timestamp")]
    InvalidExpiry,
}

/// Failures of the persistence medium behind a `TokenStore`.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode session file: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid session token: {0}")]
    Decode(#[from] DecodeError),

    #[error("Session expired at {expired_at}")]
    ExpiredSession { expired_at: DateTime<Utc> },

    #[error("Unable to connect to server: {0}")]
    Network(String),

    #[error("{0}")]
    Credential(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Server issued an unusable token: {0}")]
    ContractViolation(String),

    #[error("Failed to persist session: {0}")]
    Storage(#[from] StoreError),
}

/// Fallback shown when the server rejects credentials without a message.
const DEFAULT_CREDENTIAL_MESSAGE: &str = "Invalid credentials";

impl AuthError {
    /// Message suitable for showing next to a login or registration form.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Network(_) => {
                "Unable to connect to server. Is the backend running?".to_string()
            }
            AuthError::Credential(msg) if msg.trim().is_empty() => {
                DEFAULT_CREDENTIAL_MESSAGE.to_string()
            }
            AuthError::Credential(msg) => msg.clone(),
            _ => "An unexpected error occurred. Please try again.".to_string(),
        }
    }
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::BadRequest(msg) | ApiError::Unauthorized(msg) | ApiError::Validation(msg) => {
                AuthError::Credential(msg)
            }
            ApiError::NetworkError(e) => AuthError::Network(e.to_string()),
            other => AuthError::Server(other.to_string()),
        }
    }
}
