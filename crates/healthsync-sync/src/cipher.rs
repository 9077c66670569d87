//! # Store Encryption
//!
//! AES-256-GCM sealing for values kept in the `secure_kv` table.
//!
//! ## Stored Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  value = base64( nonce[12] ‖ ciphertext ‖ tag[16] )                    │
//! │  AAD   = key name ("credential", "device_id", ...)                     │
//! │                                                                         │
//! │  A fresh random nonce per write. Binding the key name as AAD means a   │
//! │  row copied under another name fails to open.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Source
//! The 32-byte key is per install. `HEALTHSYNC_STORE_KEY` (base64) wins;
//! otherwise the key file is read, or created on first run with mode 0600.

use base64::{engine::general_purpose, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::error::StoreError;

/// Environment variable carrying a base64 store key.
pub const STORE_KEY_ENV: &str = "HEALTHSYNC_STORE_KEY";

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// Per-install key sealing secure store values.
#[derive(Clone)]
pub struct StoreKey {
    bytes: [u8; KEY_LEN],
}

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoreKey(..)")
    }
}

impl StoreKey {
    /// Draws a new key from the system random source.
    pub fn generate() -> Result<Self, StoreError> {
        let mut bytes = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| StoreError::Key("system random source failed".into()))?;
        Ok(StoreKey { bytes })
    }

    pub fn from_base64(encoded: &str) -> Result<Self, StoreError> {
        let decoded = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| StoreError::Key(format!("key is not base64: {}", e)))?;
        let bytes: [u8; KEY_LEN] = decoded.try_into().map_err(|raw: Vec<u8>| {
            StoreError::Key(format!("key must be {} bytes, got {}", KEY_LEN, raw.len()))
        })?;
        Ok(StoreKey { bytes })
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.bytes)
    }

    /// Returns the key from `env_value` if set, else from the key file.
    pub fn resolve(env_value: Option<&str>, path: &Path) -> Result<Self, StoreError> {
        match env_value {
            Some(encoded) => {
                debug!("Using store key from environment");
                Self::from_base64(encoded)
            }
            None => Self::load_or_create(path),
        }
    }

    /// Reads the key file at `path`, creating it with a new key if missing.
    pub fn load_or_create(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            debug!(?path, "Loading store key");
            let contents = std::fs::read_to_string(path)
                .map_err(|e| StoreError::Key(format!("reading {}: {}", path.display(), e)))?;
            return Self::from_base64(&contents);
        }

        let key = Self::generate()?;
        write_private(path, key.to_base64().as_bytes())
            .map_err(|e| StoreError::Key(format!("writing {}: {}", path.display(), e)))?;
        info!(?path, "Created store key");
        Ok(key)
    }

    /// Encrypts `plaintext` stored under `name`.
    pub fn seal(&self, name: &str, plaintext: &str) -> Result<String, StoreError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|_| StoreError::Key("system random source failed".into()))?;

        let mut data = plaintext.as_bytes().to_vec();
        self.aead_key()?
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(name.as_bytes()),
                &mut data,
            )
            .map_err(|_| StoreError::Encoding {
                key: name.to_string(),
                reason: "encryption failed".into(),
            })?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(data);
        Ok(general_purpose::STANDARD.encode(combined))
    }

    /// Decrypts a value produced by [`seal`](Self::seal) for the same `name`.
    pub fn open(&self, name: &str, sealed: &str) -> Result<String, StoreError> {
        let undecryptable = |reason: &str| StoreError::Undecryptable {
            key: name.to_string(),
            reason: reason.to_string(),
        };

        let combined = general_purpose::STANDARD
            .decode(sealed)
            .map_err(|_| undecryptable("not base64"))?;
        if combined.len() < NONCE_LEN {
            return Err(undecryptable("too short"));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| undecryptable("bad nonce"))?;

        let mut data = ciphertext.to_vec();
        let plaintext = self
            .aead_key()?
            .open_in_place(nonce, Aad::from(name.as_bytes()), &mut data)
            .map_err(|_| undecryptable("authentication failed"))?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| undecryptable("not UTF-8"))
    }

    fn aead_key(&self) -> Result<LessSafeKey, StoreError> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.bytes)
            .map_err(|_| StoreError::Key("invalid AES-256 key".into()))?;
        Ok(LessSafeKey::new(unbound))
    }
}

/// Creates `path` readable by the owner only.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
