use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime given to sessions whose backend did not report an expiry (24 hours).
pub const DEFAULT_SESSION_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// Role assigned when the backend omits one.
pub const DEFAULT_ROLE: &str = "user";

/// The authenticated identity. Replaced wholesale on every successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl AuthUser {
    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or(DEFAULT_ROLE)
    }

    /// Name to show in the widget header
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

/// Credential material plus the identity it authorizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry as epoch seconds
    #[cfg_attr(feature = "ts", ts(type = "number"))]
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    /// A session is expired once `now >= expires_at`.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Has a token and has not expired
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }

    pub fn seconds_until_expiry(&self) -> i64 {
        self.expires_at.saturating_sub(Utc::now().timestamp()).max(0)
    }

    pub fn expires_at_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }
}

/// Observable authentication state.
///
/// After every completed transition `is_authenticated` equals
/// `session.is_some() && user.is_some()`. The manager replaces the whole value
/// on each update; subscribers only ever see snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AuthState {
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub user: Option<AuthUser>,
    pub session: Option<AuthSession>,
    pub error: Option<String>,
}

impl AuthState {
    pub fn authenticated(session: AuthSession) -> Self {
        Self {
            is_authenticated: true,
            is_loading: false,
            user: Some(session.user.clone()),
            session: Some(session),
            error: None,
        }
    }

    /// Drop identity and credentials, keeping `error` as given
    pub(crate) fn sign_out(&mut self, error: Option<String>) {
        self.is_authenticated = false;
        self.is_loading = false;
        self.user = None;
        self.session = None;
        self.error = error;
    }

    /// Whether `is_authenticated` agrees with the presence of user and session.
    pub fn is_consistent(&self) -> bool {
        self.is_authenticated == (self.session.is_some() && self.user.is_some())
    }
}

/// Email/password pair submitted from the login form.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}
