//! The adapter seam between the session manager and one backend's wire format.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::auth::Credentials;

use super::{ApiError, TokenRefreshAdapter, VerifyAdapter};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Header identifying the embedding page on sign-in requests.
pub const ORIGIN_HEADER: &str = "X-Widget-Origin";

/// Which HTTP contract the backend speaks for authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendFlavor {
    /// Separate access/refresh tokens, renewed through `POST /auth/refresh`.
    #[default]
    TokenRefresh,
    /// One bearer token, re-validated through `GET /auth/external`.
    VerifyRevalidate,
}

impl fmt::Display for BackendFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendFlavor::TokenRefresh => f.write_str("token-refresh"),
            BackendFlavor::VerifyRevalidate => f.write_str("verify-revalidate"),
        }
    }
}

impl FromStr for BackendFlavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "token-refresh" | "refresh" => Ok(BackendFlavor::TokenRefresh),
            "verify-revalidate" | "verify" | "external" => Ok(BackendFlavor::VerifyRevalidate),
            other => Err(format!(
                "Unknown backend flavor '{}' (expected token-refresh or verify-revalidate)",
                other
            )),
        }
    }
}

/// The locally stored credential an adapter presents to renew a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Refresh,
    Access,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::Refresh => f.write_str("refresh"),
            CredentialKind::Access => f.write_str("access"),
        }
    }
}

/// Configuration shared by every adapter flavor
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Base URL of the ticketing API, e.g. `https://support.example.com/api`
    pub base_url: String,
    /// Value sent in the origin header on sign-in
    pub origin: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl AdapterConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            origin: None,
            timeout_secs: REQUEST_TIMEOUT_SECS,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Join an endpoint path onto the base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// One backend's authentication contract.
///
/// Implementations return the backend's raw JSON on success and an
/// [`ApiError`] for transport failures or non-2xx responses. They never touch
/// the session store or publish state.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn flavor(&self) -> BackendFlavor;

    /// Which stored credential `renew` expects.
    fn renewal_credential(&self) -> CredentialKind;

    async fn sign_in(&self, credentials: &Credentials) -> Result<Value, ApiError>;

    /// Tell the backend the session is over. Callers ignore the outcome.
    async fn sign_out(&self, access_token: &str) -> Result<(), ApiError>;

    /// Exchange the renewal credential for a fresh session payload.
    async fn renew(&self, credential: &str) -> Result<Value, ApiError>;
}

/// Create the adapter for a backend flavor
pub fn adapter_for(
    config: AdapterConfig,
    flavor: BackendFlavor,
) -> Result<Box<dyn BackendAdapter>, ApiError> {
    debug!(base_url = %config.base_url, %flavor, "Creating backend adapter");
    match flavor {
        BackendFlavor::TokenRefresh => Ok(Box::new(TokenRefreshAdapter::new(config)?)),
        BackendFlavor::VerifyRevalidate => Ok(Box::new(VerifyAdapter::new(config)?)),
    }
}

/// Build the HTTP client every adapter and the ticket client share.
/// All requests carry `Content-Type: application/json` unless the request
/// sets its own (multipart uploads do).
pub(crate) fn create_http_client(config: &AdapterConfig) -> Result<Client, ApiError> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/json"),
    );

    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .default_headers(headers)
        .build()?;
    Ok(client)
}

/// Check if response is successful, returning a rejection built from the body if not.
pub(crate) async fn check_response(response: Response) -> Result<Response, ApiError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(%status, body = %ApiError::truncate_body(&body), "Backend rejected request");
        Err(ApiError::from_status(status, &body))
    }
}

/// Read a successful response body as JSON
pub(crate) async fn read_json(response: Response) -> Result<Value, ApiError> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Err(ApiError::InvalidResponse("Empty response body".to_string()));
    }
    serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}
