//! Encrypted vault backups: an S3-served JSON snapshot of fig families, keyed by the client's
//! public-key fingerprint and decryptable only with the matching private key.
use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto::{self, CryptoError};
use crate::model::FigFamily;
use crate::{Error, Result};

mod fetcher;

pub use fetcher::{BackupFetcher, HttpBackupFetcher};

/// Outer envelope of a vault backup object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultBackup {
    #[allow(missing_docs)]
    pub version: String,
    /// Fingerprint of the public key the session key is encrypted for.
    pub key_fingerprint: String,
    /// Base64 RSA-OAEP-encrypted AES session key.
    pub encrypted_key: String,
    /// Base64 AES-GCM ciphertext of the UTF-8 JSON-encoded [`VaultPayload`].
    pub encrypted_data: String,
}

/// Decrypted contents of a vault backup.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VaultPayload {
    #[allow(missing_docs)]
    pub tenant_id: String,
    #[allow(missing_docs)]
    pub generated_at: String,
    /// Cursor the backup was taken at; seeds per-namespace cursors during bootstrap.
    pub sync_token: String,
    #[allow(missing_docs)]
    pub items: Vec<FigFamily>,
}

/// Fetches and decrypts the vault backup for this client's key.
pub struct VaultService {
    fetcher: Arc<dyn BackupFetcher>,
    private_key_path: Option<PathBuf>,
    enabled: bool,
}

impl VaultService {
    #[allow(missing_docs)]
    pub fn new(
        fetcher: Arc<dyn BackupFetcher>,
        private_key_path: Option<PathBuf>,
        enabled: bool,
    ) -> Self {
        VaultService {
            fetcher,
            private_key_path,
            enabled,
        }
    }

    /// Fetch and decrypt the backup.
    ///
    /// # Errors
    ///
    /// [`Error::VaultDisabled`] when the vault is disabled by configuration; transport, codec,
    /// and crypto errors otherwise.
    pub async fn load_backup(&self) -> Result<VaultPayload> {
        if !self.enabled {
            return Err(Error::VaultDisabled);
        }
        let key_path = self.private_key_path.as_ref().ok_or_else(|| {
            Error::InvalidConfiguration("vault_private_key_path is not configured".to_owned())
        })?;

        let private_key = crypto::load_rsa_private_key(key_path)?;
        let fingerprint = crypto::key_fingerprint(&private_key)?;

        let backup_bytes = self.fetcher.fetch_backup(&fingerprint).await?;
        let backup: VaultBackup = serde_json::from_slice(&backup_bytes)?;

        let encrypted_key = BASE64
            .decode(&backup.encrypted_key)
            .map_err(CryptoError::Base64)?;
        let session_key = crypto::decrypt_rsa_oaep(&encrypted_key, &private_key)?;

        let encrypted_data = BASE64
            .decode(&backup.encrypted_data)
            .map_err(CryptoError::Base64)?;
        let payload_json = crypto::decrypt_aes_gcm(&encrypted_data, &session_key)?;

        let payload: VaultPayload = serde_json::from_slice(&payload_json)?;
        log::debug!(target: "figchain",
            "loaded vault backup: {} items, sync token {:?}", payload.items.len(), payload.sync_token);
        Ok(payload)
    }
}
