use anyhow::{bail, Context, Result};
use keyring::Entry;
use tracing::{debug, warn};

use crate::auth::AuthSession;

use super::{SessionStore, SESSION_KEY};

const SERVICE_NAME: &str = "supportdesk";

/// Keeps the session JSON in the OS keychain.
///
/// One `Entry` is created up front and reused, so every read and write goes
/// through the same credential.
pub struct KeyringSessionStore {
    entry: Entry,
}

impl KeyringSessionStore {
    pub fn new() -> Result<Self> {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a different keychain service name, e.g. one per embedding site
    pub fn with_service(service: &str) -> Result<Self> {
        let entry = Entry::new(service, SESSION_KEY).context("Failed to create keyring entry")?;
        Ok(Self { entry })
    }

    fn load(&self) -> Result<Option<AuthSession>> {
        match self.entry.get_password() {
            Ok(contents) => {
                let session = serde_json::from_str(&contents)
                    .context("Failed to parse session from keychain")?;
                Ok(Some(session))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read session from keychain"),
        }
    }

    /// Write the session and read it back; a keychain that accepts the write
    /// but cannot return it counts as a failed write.
    fn save(&self, session: &AuthSession) -> Result<()> {
        let contents = serde_json::to_string(session)?;
        self.entry
            .set_password(&contents)
            .context("Failed to store session in keychain")?;

        let stored = self
            .entry
            .get_password()
            .context("Session written to keychain could not be read back")?;
        if stored != contents {
            bail!("Keychain returned a different session than was written");
        }
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}

impl SessionStore for KeyringSessionStore {
    fn get_session(&self) -> Option<AuthSession> {
        self.load().unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable keychain session");
            None
        })
    }

    fn store_session(&self, session: &AuthSession) -> bool {
        match self.save(session) {
            Ok(()) => {
                debug!("Session saved to keychain");
                true
            }
            Err(e) => {
                warn!(error = format!("{:#}", e), "Failed to save session");
                false
            }
        }
    }

    fn clear_session(&self) {
        if let Err(e) = self.delete() {
            warn!(error = %e, "Failed to clear keychain session");
        }
    }
}
