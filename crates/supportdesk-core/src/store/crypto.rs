//! At-rest encryption for the persisted session record.
//!
//! A 256-bit key is derived from a passphrase with Argon2id and a per-write
//! random salt; the record is sealed with ChaCha20-Poly1305 under a random
//! 96-bit nonce. Salt, nonce and ciphertext travel together in an envelope.

use anyhow::{anyhow, bail, Context, Result};
use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

const ENVELOPE_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub v: u8,
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

/// Seals and opens session records with a passphrase-derived key
#[derive(Clone)]
pub struct SessionCipher {
    passphrase: String,
}

impl SessionCipher {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
        }
    }

    fn derive_key(&self, salt: &[u8]) -> Result<[u8; KEY_LEN]> {
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(self.passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| anyhow!("Key derivation failed: {}", e))?;
        Ok(key)
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<EncryptedEnvelope> {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let key = self.derive_key(&salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| anyhow!("Failed to encrypt session"))?;

        Ok(EncryptedEnvelope {
            v: ENVELOPE_VERSION,
            salt: BASE64.encode(salt),
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    pub fn open(&self, envelope: &EncryptedEnvelope) -> Result<Vec<u8>> {
        if envelope.v != ENVELOPE_VERSION {
            bail!("Unsupported session envelope version {}", envelope.v);
        }

        let salt = BASE64.decode(&envelope.salt).context("Invalid salt encoding")?;
        let nonce = BASE64.decode(&envelope.nonce).context("Invalid nonce encoding")?;
        let ciphertext = BASE64
            .decode(&envelope.ciphertext)
            .context("Invalid ciphertext encoding")?;
        if nonce.len() != NONCE_LEN {
            bail!("Invalid nonce length {}", nonce.len());
        }

        let key = self.derive_key(&salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| anyhow!("Failed to decrypt session (wrong passphrase or corrupted file)"))
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionCipher(<redacted>)")
    }
}
