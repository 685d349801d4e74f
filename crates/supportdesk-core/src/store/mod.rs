//! Session persistence module.
//!
//! This module provides the `SessionStore` trait the session manager persists
//! through, and three implementations:
//! - `MemorySessionStore`: process-local, for tests and ephemeral widgets
//! - `FileSessionStore`: `session.json` in the cache directory, optionally encrypted
//! - `KeyringSessionStore`: one OS keychain entry
//!
//! Every store holds at most one session under the well-known key `session`.

pub mod crypto;
pub mod file;
pub mod keychain;
pub mod memory;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthSession, AuthUser};

pub use file::FileSessionStore;
pub use keychain::KeyringSessionStore;
pub use memory::MemorySessionStore;
pub use crypto::SessionCipher;

/// Key the single session record lives under
pub const SESSION_KEY: &str = "session";

/// Durable storage for at most one `AuthSession`.
///
/// Reads tolerate a missing or corrupted record by returning the absent value;
/// `store_session` reports failure through its return value. Stores never
/// modify a session they are given.
pub trait SessionStore: Send + Sync {
    fn get_session(&self) -> Option<AuthSession>;

    /// Persist `session`, replacing any previous record. Returns false if the
    /// write did not happen.
    fn store_session(&self, session: &AuthSession) -> bool;

    fn clear_session(&self);

    /// True iff `now >= expires_at`
    fn is_session_expired(&self, session: &AuthSession) -> bool {
        session.is_expired()
    }

    /// A stored session with a token that has not expired
    fn is_authenticated(&self) -> bool {
        self.get_session()
            .map(|s| !s.access_token.is_empty() && !self.is_session_expired(&s))
            .unwrap_or(false)
    }

    /// The stored access token, expired or not
    fn get_access_token(&self) -> Option<String> {
        self.get_session()
            .map(|s| s.access_token)
            .filter(|t| !t.is_empty())
    }

    fn get_refresh_token(&self) -> Option<String> {
        self.get_session()
            .and_then(|s| s.refresh_token)
            .filter(|t| !t.is_empty())
    }

    fn get_current_user(&self) -> Option<AuthUser> {
        self.get_session().map(|s| s.user)
    }
}

/// Which `SessionStore` implementation to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::File => f.write_str("file"),
            StoreKind::Keyring => f.write_str("keyring"),
            StoreKind::Memory => f.write_str("memory"),
        }
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StoreKind::File),
            "keyring" | "keychain" => Ok(StoreKind::Keyring),
            "memory" => Ok(StoreKind::Memory),
            other => Err(format!(
                "Unknown session store '{}' (expected file, keyring or memory)",
                other
            )),
        }
    }
}

/// Open the configured store. `session_dir` is only used by the file store.
pub fn open_store(
    kind: StoreKind,
    session_dir: PathBuf,
    passphrase: Option<&str>,
) -> Result<Arc<dyn SessionStore>> {
    let store: Arc<dyn SessionStore> = match kind {
        StoreKind::File => {
            let store = FileSessionStore::new(session_dir);
            match passphrase {
                Some(p) if !p.is_empty() => Arc::new(store.with_cipher(SessionCipher::new(p))),
                _ => Arc::new(store),
            }
        }
        StoreKind::Keyring => Arc::new(KeyringSessionStore::new()?),
        StoreKind::Memory => Arc::new(MemorySessionStore::new()),
    };
    Ok(store)
}
