//! src/keys.rs
//!
//! Long-term ed25519 identity for each role, persisted on disk, and the
//! authorized-client set the Collector's client-facing endpoint checks
//! against. Grounded on `examples/original_source/app_core.py`'s
//! `KeyMonkey`, which persists one Curve keypair per role under a directory
//! and loads a directory of peer public keys for authorization.

use crate::error::{Error, Result};
use ed25519_dalek::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fs;
use std::path::{Path, PathBuf};

/// Where each role's long-term identity and the authorized-client set live.
pub trait KeyProvider {
    /// Load this role's signing key, generating and persisting one on first use.
    fn load_local_keypair(&self) -> Result<SigningKey>;

    /// Load a named peer's public key (pre-authorizing a client by name).
    fn load_remote_public(&self, name: &str) -> Result<VerifyingKey>;

    /// Directory holding one raw public-key file per authorized client.
    fn authorized_client_dir(&self) -> &Path;
}

/// Reads/writes key material under a directory: `<role>.key_secret` (PKCS8
/// DER) and `<role>.key` (raw 32-byte public key), plus an
/// `authorized_clients/` subdirectory of raw public-key files, one per
/// client permitted onto the client port.
pub struct FileKeyProvider {
    dir: PathBuf,
    role: String,
    authorized_dir: PathBuf,
}

impl FileKeyProvider {
    pub fn new(dir: impl Into<PathBuf>, role: impl Into<String>) -> Self {
        let dir = dir.into();
        let authorized_dir = dir.join("authorized_clients");
        Self {
            dir,
            role: role.into(),
            authorized_dir,
        }
    }

    fn secret_path(&self) -> PathBuf {
        self.dir.join(format!("{}.key_secret", self.role))
    }

    fn public_path(&self) -> PathBuf {
        self.dir.join(format!("{}.key", self.role))
    }
}

impl KeyProvider for FileKeyProvider {
    fn load_local_keypair(&self) -> Result<SigningKey> {
        let secret_path = self.secret_path();
        if let Ok(der) = fs::read(&secret_path) {
            return SigningKey::from_pkcs8_der(&der)
                .map_err(|_| Error::InvalidKeyFile(secret_path));
        }

        fs::create_dir_all(&self.dir)?;
        let signing_key = SigningKey::generate(&mut OsRng);
        let der = signing_key
            .to_pkcs8_der()
            .map_err(|_| Error::InvalidKeyFile(secret_path.clone()))?;
        fs::write(&secret_path, der.as_bytes())?;
        fs::write(self.public_path(), signing_key.verifying_key().to_bytes())?;
        tracing::info!(role = %self.role, path = %secret_path.display(), "generated new long-term keypair");
        Ok(signing_key)
    }

    fn load_remote_public(&self, name: &str) -> Result<VerifyingKey> {
        let path = self.dir.join(format!("{}.key", name));
        read_public_key(&path)
    }

    fn authorized_client_dir(&self) -> &Path {
        &self.authorized_dir
    }
}

fn read_public_key(path: &Path) -> Result<VerifyingKey> {
    let bytes = fs::read(path).map_err(|_| Error::InvalidKeyFile(path.to_path_buf()))?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::InvalidKeyFile(path.to_path_buf()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| Error::InvalidKeyFile(path.to_path_buf()))
}

/// Every raw public key currently on file in `authorized_client_dir()`.
/// Missing or unreadable directory means nobody is authorized yet, not an
/// error — an operator populates it by dropping `<name>.key` files in.
pub fn authorized_keys(dir: &Path) -> Vec<VerifyingKey> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| read_public_key(&entry.path()).ok())
        .collect()
}
