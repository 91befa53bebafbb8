//! Transparent envelope decryption for encrypted figs.
//!
//! An encrypted fig carries `IV || ciphertext || tag` as its payload and an RFC 3394-wrapped data
//! encryption key. The wrapping key (NSK) is namespace-scoped, served by the transport
//! RSA-OAEP-encrypted for this client's public key, and cached by key id for the lifetime of the
//! client.
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::RsaPrivateKey;

use crate::crypto::{self, CryptoError};
use crate::model::Fig;
use crate::transport::Transport;
use crate::{Error, Result};

/// Decrypts encrypted figs with the client's RSA private key, resolving and caching namespace
/// wrapping keys through the transport.
pub struct EncryptionService {
    transport: Arc<dyn Transport>,
    private_key: RsaPrivateKey,
    // Insert-or-get: two callers racing on the same keyId both compute and store the same value.
    nsk_cache: RwLock<HashMap<String, Vec<u8>>>,
}

impl EncryptionService {
    /// Create a service from a PEM private key file (PKCS#8 or PKCS#1).
    pub fn new(transport: Arc<dyn Transport>, private_key_path: impl AsRef<Path>) -> Result<Self> {
        let private_key = crypto::load_rsa_private_key(private_key_path)?;
        Ok(Self::with_key(transport, private_key))
    }

    /// Create a service from an already-loaded private key.
    pub fn with_key(transport: Arc<dyn Transport>, private_key: RsaPrivateKey) -> Self {
        EncryptionService {
            transport,
            private_key,
            nsk_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Decrypt the fig's payload. Plaintext figs pass through unchanged.
    pub async fn decrypt(&self, fig: &Fig, namespace: &str) -> Result<Vec<u8>> {
        if !fig.is_encrypted {
            return Ok(fig.payload.clone());
        }

        let key_id = fig.key_id.as_deref().unwrap_or("");
        let nsk = self.namespace_key(namespace, key_id).await?;

        let wrapped_dek = fig
            .wrapped_dek
            .as_deref()
            .filter(|dek| !dek.is_empty())
            .ok_or_else(|| {
                Error::Crypto(CryptoError::InvalidWrappedKeyLength(0))
            })?;

        let dek = crypto::unwrap_aes_key(wrapped_dek, &nsk)?;
        let payload = crypto::decrypt_aes_gcm(&fig.payload, &dek)?;

        log::debug!(target: "figchain",
            "decrypted fig {}: {} -> {} bytes", fig.fig_id, fig.payload.len(), payload.len());

        Ok(payload)
    }

    /// Resolve the namespace wrapping key, consulting the cache first.
    async fn namespace_key(&self, namespace: &str, key_id: &str) -> Result<Vec<u8>> {
        if !key_id.is_empty() {
            let cache = self
                .nsk_cache
                .read()
                .expect("thread holding nsk cache lock should not panic");
            if let Some(nsk) = cache.get(key_id) {
                return Ok(nsk.clone());
            }
        }

        let keys = self.transport.get_namespace_key(namespace).await?;

        let matching = if key_id.is_empty() {
            match keys.len() {
                0 => {
                    return Err(Error::NamespaceKeyNotFound {
                        namespace: namespace.to_owned(),
                    })
                }
                1 => &keys[0],
                // Multiple keys exist but the fig names none; guessing would decrypt with an
                // arbitrary key.
                count => {
                    return Err(Error::AmbiguousNamespaceKey {
                        namespace: namespace.to_owned(),
                        count,
                    })
                }
            }
        } else {
            keys.iter()
                .find(|key| key.key_id == key_id)
                .ok_or_else(|| Error::NamespaceKeyNotFound {
                    namespace: namespace.to_owned(),
                })?
        };

        let wrapped = BASE64
            .decode(&matching.wrapped_key)
            .map_err(CryptoError::Base64)?;
        let nsk = crypto::decrypt_rsa_oaep(&wrapped, &self.private_key)?;

        if !matching.key_id.is_empty() {
            let mut cache = self
                .nsk_cache
                .write()
                .expect("thread holding nsk cache lock should not panic");
            cache.insert(matching.key_id.clone(), nsk.clone());
        }

        Ok(nsk)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use rand::rngs::OsRng;
    use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
    use sha2::Sha256;

    use super::EncryptionService;
    use crate::crypto::{self, testutil, CryptoError};
    use crate::model::{
        Fig, InitialFetchRequest, InitialFetchResponse, NamespaceKey, UpdateFetchRequest,
        UpdateFetchResponse, UserPublicKey,
    };
    use crate::transport::Transport;
    use crate::{Error, Result};

    struct KeyServer {
        keys: Vec<NamespaceKey>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for KeyServer {
        async fn fetch_initial(&self, _req: &InitialFetchRequest) -> Result<InitialFetchResponse> {
            unimplemented!("not used by encryption tests")
        }

        async fn fetch_update(&self, _req: &UpdateFetchRequest) -> Result<UpdateFetchResponse> {
            unimplemented!("not used by encryption tests")
        }

        async fn get_namespace_key(&self, _namespace: &str) -> Result<Vec<NamespaceKey>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.keys.clone())
        }

        async fn upload_public_key(&self, _key: &UserPublicKey) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        service: EncryptionService,
        transport: Arc<KeyServer>,
        fig: Fig,
    }

    /// Build a full envelope: NSK wrapped with RSA-OAEP, DEK wrapped with AES-KW, payload sealed
    /// with AES-GCM.
    fn fixture(key_ids: &[&str], fig_key_id: Option<&str>, plaintext: &[u8]) -> Fixture {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);

        let nsk = [5u8; 32];
        let dek = [6u8; 32];

        let wrapped_nsk = public_key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &nsk)
            .unwrap();
        let keys = key_ids
            .iter()
            .map(|id| NamespaceKey {
                wrapped_key: BASE64.encode(&wrapped_nsk),
                key_id: id.to_string(),
            })
            .collect();

        let fig = Fig {
            fig_id: "f-1".to_owned(),
            version: "v1".to_owned(),
            payload: testutil::encrypt_aes_gcm(plaintext, &dek, &[2u8; 12]),
            is_encrypted: true,
            wrapped_dek: Some(crypto::wrap_aes_key(&dek, &nsk).unwrap()),
            key_id: fig_key_id.map(str::to_owned),
        };

        let transport = Arc::new(KeyServer {
            keys,
            calls: AtomicUsize::new(0),
        });
        let service = EncryptionService::with_key(transport.clone(), private_key);
        Fixture {
            service,
            transport,
            fig,
        }
    }

    #[tokio::test]
    async fn decrypts_with_the_single_anonymous_namespace_key() {
        let fx = fixture(&[""], None, br#"{"x":1}"#);
        let plaintext = fx.service.decrypt(&fx.fig, "ns").await.unwrap();
        assert_eq!(plaintext, br#"{"x":1}"#);
    }

    #[tokio::test]
    async fn plaintext_fig_passes_through() {
        let fx = fixture(&[""], None, b"ignored");
        let fig = Fig {
            is_encrypted: false,
            payload: b"plain".to_vec(),
            ..fx.fig
        };
        assert_eq!(fx.service.decrypt(&fig, "ns").await.unwrap(), b"plain");
        assert_eq!(fx.transport.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn caches_the_namespace_key_by_key_id() {
        let fx = fixture(&["k-1"], Some("k-1"), b"secret");
        assert_eq!(fx.service.decrypt(&fx.fig, "ns").await.unwrap(), b"secret");
        assert_eq!(fx.service.decrypt(&fx.fig, "ns").await.unwrap(), b"secret");
        // Second decrypt is served from the cache.
        assert_eq!(fx.transport.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn anonymous_key_is_not_cached() {
        let fx = fixture(&[""], None, b"secret");
        fx.service.decrypt(&fx.fig, "ns").await.unwrap();
        fx.service.decrypt(&fx.fig, "ns").await.unwrap();
        assert_eq!(fx.transport.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_keys_is_not_found() {
        let fx = fixture(&[], None, b"secret");
        let err = fx.service.decrypt(&fx.fig, "ns").await.unwrap_err();
        assert!(matches!(err, Error::NamespaceKeyNotFound { namespace } if namespace == "ns"));
    }

    #[tokio::test]
    async fn multiple_keys_without_key_id_is_ambiguous() {
        let fx = fixture(&["k-1", "k-2"], None, b"secret");
        let err = fx.service.decrypt(&fx.fig, "ns").await.unwrap_err();
        assert!(matches!(err, Error::AmbiguousNamespaceKey { count: 2, .. }));
    }

    #[tokio::test]
    async fn unknown_key_id_is_not_found() {
        let fx = fixture(&["k-1"], Some("k-9"), b"secret");
        let err = fx.service.decrypt(&fx.fig, "ns").await.unwrap_err();
        assert!(matches!(err, Error::NamespaceKeyNotFound { .. }));
    }

    #[tokio::test]
    async fn missing_wrapped_dek_is_rejected() {
        let fx = fixture(&[""], None, b"secret");
        let fig = Fig {
            wrapped_dek: None,
            ..fx.fig
        };
        let err = fx.service.decrypt(&fig, "ns").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Crypto(CryptoError::InvalidWrappedKeyLength(0))
        ));
    }

    #[tokio::test]
    async fn tampered_wrapped_dek_fails_integrity() {
        let fx = fixture(&[""], None, b"secret");
        let mut fig = fx.fig.clone();
        if let Some(dek) = fig.wrapped_dek.as_mut() {
            dek[0] ^= 0x01;
        }
        let err = fx.service.decrypt(&fig, "ns").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Crypto(CryptoError::IntegrityCheckFailed)
        ));
    }
}
