//! Adapter for backends that re-validate a single bearer token.
//!
//! Sign-in goes through `POST /auth/external` with an `action` discriminator,
//! and "refresh" is a `GET /auth/external` that re-checks the current access
//! token. A successful check may come back without any token at all, in which
//! case the presented token stays in use.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::auth::Credentials;

use super::adapter::{check_response, create_http_client, read_json, ORIGIN_HEADER};
use super::{AdapterConfig, ApiError, BackendAdapter, BackendFlavor, CredentialKind};

const SIGN_IN_ACTION: &str = "signIn";

#[derive(Serialize)]
struct ExternalSignInRequest<'a> {
    action: &'static str,
    email: &'a str,
    password: &'a str,
}

#[derive(Clone)]
pub struct VerifyAdapter {
    client: Client,
    config: AdapterConfig,
}

impl VerifyAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self, ApiError> {
        let client = create_http_client(&config)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl BackendAdapter for VerifyAdapter {
    fn flavor(&self) -> BackendFlavor {
        BackendFlavor::VerifyRevalidate
    }

    fn renewal_credential(&self) -> CredentialKind {
        CredentialKind::Access
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Value, ApiError> {
        let url = self.config.endpoint("/auth/external");
        debug!(url = %url, "Sending external sign-in request");

        let mut request = self.client.post(&url).json(&ExternalSignInRequest {
            action: SIGN_IN_ACTION,
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
        let url = self.config.endpoint("/auth/external");
        debug!(url = %url, "Re-validating access token");

        let response = self.client.get(&url).bearer_auth(credential).send().await?;
        let response = check_response(response).await?;
        read_json(response).await
    }
}
