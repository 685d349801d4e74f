//! Client for the ticketing API's ticket endpoints.

use std::fmt;
use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::api::adapter::{check_response, create_http_client};
use crate::api::{AdapterConfig, ApiError};
use crate::auth::SessionManager;

use super::validate::{validate_email, validate_max_len, validate_required, ValidationError};

const MAX_SUBJECT_LEN: usize = 200;
const MAX_MESSAGE_LEN: usize = 10_000;

#[derive(Error, Debug)]
pub enum TicketError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("{}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    Api(#[from] ApiError),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Ticket as submitted from the widget form
#[derive(Debug, Clone, Serialize)]
pub struct NewTicket {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub priority: Priority,
}

impl NewTicket {
    /// Check every field, collecting all problems rather than stopping at the first
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let errors: Vec<ValidationError> = [
            validate_required("name", &self.name),
            validate_required("email", &self.email).and_then(|_| validate_email("email", &self.email)),
            validate_required("subject", &self.subject)
                .and_then(|_| validate_max_len("subject", &self.subject, MAX_SUBJECT_LEN)),
            validate_required("message", &self.message)
                .and_then(|_| validate_max_len("message", &self.message, MAX_MESSAGE_LEN)),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Ticket {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Attachment {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "fileName")]
    pub file_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Ticket ids arrive as strings from some backends and integers from others
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Creates tickets and uploads attachments on behalf of the signed-in user
pub struct TicketClient {
    client: Client,
    config: AdapterConfig,
    sessions: Arc<SessionManager>,
}

impl TicketClient {
    pub fn new(config: AdapterConfig, sessions: Arc<SessionManager>) -> Result<Self, ApiError> {
        let client = create_http_client(&config)?;
        Ok(Self {
            client,
            config,
            sessions,
        })
    }

    async fn token(&self) -> Result<String, TicketError> {
        self.sessions
            .ensure_access_token()
            .await
            .ok_or(TicketError::NotAuthenticated)
    }

    pub async fn create_ticket(&self, ticket: &NewTicket) -> Result<Ticket, TicketError> {
        ticket.validate().map_err(TicketError::Validation)?;
        let token = self.token().await?;

        let url = self.config.endpoint("/tickets");
        debug!(url = %url, priority = ?ticket.priority, "Creating ticket");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(ticket)
            .send()
            .await
            .map_err(ApiError::from)?;
        let response = check_response(response).await?;
        let created: Ticket = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        info!(ticket_id = %created.id, "Ticket created");
        Ok(created)
    }

    pub async fn upload_file(
        &self,
        ticket_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        mime: Option<&str>,
    ) -> Result<Attachment, TicketError> {
        let token = self.token().await?;

        let mut part = Part::bytes(bytes).file_name(file_name.to_string());
        if let Some(mime) = mime {
            part = part.mime_str(mime).map_err(ApiError::from)?;
        }
        let form = Form::new().part("file", part);

        let url = self.config.endpoint(&format!("/tickets/{}/attachments", ticket_id));
        debug!(url = %url, file_name, "Uploading attachment");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::from)?;
        let response = check_response(response).await?;
        let attachment: Attachment = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        info!(ticket_id, attachment_id = %attachment.id, "Attachment uploaded");
        Ok(attachment)
    }
}

impl fmt::Debug for TicketClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketClient")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}
