use thiserror::Error;

use crate::api::{ApiError, CredentialKind};

/// Failures of session manager operations.
///
/// `Display` is exactly the message published in `AuthState::error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The backend answered with a non-success status
    #[error("{0}")]
    Rejected(String),

    /// The request never produced a response
    #[error("{0}")]
    Transport(String),

    /// A success response that could not be turned into a session
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No {0} token available")]
    NoCredential(CredentialKind),

    #[error("Session expired")]
    SessionExpired,

    #[error("Session refresh failed")]
    RefreshFailed,
}

impl AuthError {
    /// Map a failed sign-in exchange, templating the message when the
    /// backend did not provide one.
    pub fn from_login(err: ApiError) -> Self {
        match err {
            ApiError::Rejected { status, message } => {
                AuthError::Rejected(message.unwrap_or_else(|| format!("Login failed: {}", status)))
            }
            ApiError::Network(e) => AuthError::Transport(format!("Network error: {}", e)),
            ApiError::InvalidResponse(m) => AuthError::InvalidResponse(m),
        }
    }

    /// Map a failed renewal: a backend rejection means the session is gone,
    /// anything else means we could not find out.
    pub fn from_refresh(err: &ApiError) -> Self {
        if err.is_rejection() {
            AuthError::SessionExpired
        } else {
            AuthError::RefreshFailed
        }
    }
}
