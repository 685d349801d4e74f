//! Adapter for backends that issue separate access and refresh tokens.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::auth::Credentials;

use super::adapter::{check_response, create_http_client, read_json, ORIGIN_HEADER};
use super::{AdapterConfig, ApiError, BackendAdapter, BackendFlavor, CredentialKind};

#[derive(Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// `POST /auth/signin`, `POST /auth/signout`, `POST /auth/refresh`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct TokenRefreshAdapter {
    client: Client,
    config: AdapterConfig,
}

impl TokenRefreshAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self, ApiError> {
        let client = create_http_client(&config)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl BackendAdapter for TokenRefreshAdapter {
    fn flavor(&self) -> BackendFlavor {
        BackendFlavor::TokenRefresh
    }

    fn renewal_credential(&self) -> CredentialKind {
        CredentialKind::Refresh
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Value, ApiError> {
        let url = self.config.endpoint("/auth/signin");
        debug!(url = %url, "Sending sign-in request");

        let mut request = self.client.post(&url).json(&SignInRequest {
            email: &credentials.email,
            password: &credentials.password,
        });
        if let Some(ref origin) = self.config.origin {
            request = request.header(ORIGIN_HEADER, origin);
        }

        let response = check_response(request.send().await?).await?;
        read_json(response).await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ApiError> {
        let url = self.config.endpoint("/auth/signout");
        let response = self.client.post(&url).bearer_auth(access_token).send().await?;
        check_response(response).await?;
        Ok(())
    }

    async fn renew(&self, credential: &str) -> Result<Value, ApiError> {
        let url = self.config.endpoint("/auth/refresh");
        debug!(url = %url, "Refreshing session");

        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest {
                refresh_token: credential,
            })
            .send()
            .await?;

        let response = check_response(response).await?;
        read_json(response).await
    }
}
