use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::AuthSession;

use super::crypto::{EncryptedEnvelope, SessionCipher};
use super::{SessionStore, SESSION_KEY};

/// Session record as `<dir>/session.json`, optionally sealed with a `SessionCipher`.
pub struct FileSessionStore {
    dir: PathBuf,
    cipher: Option<SessionCipher>,
}

impl FileSessionStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir, cipher: None }
    }

    pub fn with_cipher(mut self, cipher: SessionCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn session_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", SESSION_KEY))
    }

    /// Load session from disk
    fn load(&self) -> Result<Option<AuthSession>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let session = match self.cipher {
            Some(ref cipher) => {
                let envelope: EncryptedEnvelope = serde_json::from_str(&contents)
                    .context("Failed to parse encrypted session file")?;
                let plaintext = cipher.open(&envelope)?;
                serde_json::from_slice(&plaintext).context("Failed to parse decrypted session")?
            }
            None => serde_json::from_str(&contents).context("Failed to parse session file")?,
        };
        Ok(Some(session))
    }

    /// Save session to disk
    fn save(&self, session: &AuthSession) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = match self.cipher {
            Some(ref cipher) => {
                let plaintext = serde_json::to_vec(session)?;
                serde_json::to_string_pretty(&cipher.seal(&plaintext)?)?
            }
            None => serde_json::to_string_pretty(session)?,
        };
        write_private(&path, contents.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Whether the file on disk is an encrypted envelope
    pub fn is_encrypted_on_disk(&self) -> bool {
        std::fs::read_to_string(self.session_path())
            .ok()
            .and_then(|c| serde_json::from_str::<Value>(&c).ok())
            .map(|v| v.get("ciphertext").is_some())
            .unwrap_or(false)
    }
}

/// Write `contents` to a file only the owner can read. A new file is created
/// with mode 0600; an existing one is narrowed before it is truncated.
#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    if path.exists() {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

impl SessionStore for FileSessionStore {
    fn get_session(&self) -> Option<AuthSession> {
        match self.load() {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable session file");
                None
            }
        }
    }

    fn store_session(&self, session: &AuthSession) -> bool {
        match self.save(session) {
            Ok(()) => {
                debug!(path = %self.session_path().display(), "Session saved");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to save session");
                false
            }
        }
    }

    fn clear_session(&self) {
        if let Err(e) = self.remove() {
            warn!(error = %e, "Failed to remove session file");
        }
    }
}
