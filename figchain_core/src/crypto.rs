//! Cryptographic primitives for the envelope decryption pipeline: RSA-OAEP-SHA256, AES key
//! unwrap (RFC 3394), AES-GCM, and the SHA-256 public-key fingerprint.
use std::path::Path;
use std::sync::Arc;

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256, Block};
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::Aead;
use aes_gcm::{AesGcm, Nonce};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::{Oaep, RsaPrivateKey};
use sha2::{Digest, Sha256};

type Aes128Gcm = AesGcm<Aes128, U12>;
type Aes192Gcm = AesGcm<Aes192, U12>;
type Aes256Gcm = AesGcm<Aes256, U12>;

/// Size of the AES-GCM nonce prepended to encrypted payloads.
pub const GCM_NONCE_SIZE: usize = 12;

/// RFC 3394 integrity sentinel.
const KEY_WRAP_IV: u64 = 0xA6A6_A6A6_A6A6_A6A6;

/// Errors from the cryptographic primitives.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum CryptoError {
    /// Failed to read a key file from disk.
    #[error("failed to read private key file {path}")]
    ReadKey {
        /// The path that failed to read.
        path: String,
        #[source]
        // std::io::Error is not clonable, so we're wrapping it in an Arc.
        source: Arc<std::io::Error>,
    },

    /// The PEM contents parsed as neither PKCS#8 nor PKCS#1 RSA.
    #[error("failed to parse private key (tried PKCS#8 and PKCS#1)")]
    ParseKey,

    /// Failed to encode the public key as PKIX/SubjectPublicKeyInfo DER.
    #[error("failed to encode public key: {0}")]
    EncodePublicKey(String),

    /// RSA-OAEP decryption failed.
    #[error("rsa decryption failed: {0}")]
    Rsa(String),

    /// A base64 field failed to decode.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The ciphertext is shorter than the nonce it must start with.
    #[error("cipher text too short")]
    CiphertextTooShort,

    /// AES keys must be 16, 24, or 32 bytes.
    #[error("invalid AES key length: {0} bytes")]
    InvalidKeyLength(usize),

    /// Wrapped keys must be a multiple of 8 bytes and at least 16.
    #[error("invalid wrapped key length: {0} bytes")]
    InvalidWrappedKeyLength(usize),

    /// The RFC 3394 integrity sentinel did not verify after unwrapping.
    #[error("integrity check failed")]
    IntegrityCheckFailed,

    /// AES-GCM decryption failed (tampered ciphertext or wrong key).
    #[error("aes-gcm decryption failed")]
    AeadFailed,
}

/// Load an RSA private key from a PEM-encoded file. Both PKCS#8 and PKCS#1 formats are accepted
/// and auto-detected.
pub fn load_rsa_private_key(path: impl AsRef<Path>) -> Result<RsaPrivateKey, CryptoError> {
    let path = path.as_ref();
    let pem = std::fs::read_to_string(path).map_err(|err| CryptoError::ReadKey {
        path: path.display().to_string(),
        source: Arc::new(err),
    })?;
    parse_rsa_private_key(&pem)
}

/// Parse an RSA private key from PEM-encoded contents, trying PKCS#8 then PKCS#1.
pub fn parse_rsa_private_key(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|_| CryptoError::ParseKey)
}

/// SHA-256 fingerprint of the key's public half, computed over its PKIX/SubjectPublicKeyInfo DER
/// encoding and rendered as lowercase hex. Selects the backup blob and correlates with
/// server-side key registration.
pub fn key_fingerprint(key: &RsaPrivateKey) -> Result<String, CryptoError> {
    let der = key
        .to_public_key()
        .to_public_key_der()
        .map_err(|err| CryptoError::EncodePublicKey(err.to_string()))?;
    let digest = Sha256::digest(der.as_bytes());
    Ok(hex::encode(digest))
}

/// RSA-OAEP decrypt with SHA-256 (MGF1-SHA256, empty label).
pub fn decrypt_rsa_oaep(
    ciphertext: &[u8],
    private_key: &RsaPrivateKey,
) -> Result<Vec<u8>, CryptoError> {
    private_key
        .decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|err| CryptoError::Rsa(err.to_string()))
}

/// AES-GCM decrypt `IV(12) || ciphertext || tag(16)` with a 128-bit tag.
pub fn decrypt_aes_gcm(ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < GCM_NONCE_SIZE {
        return Err(CryptoError::CiphertextTooShort);
    }
    let (iv, body) = ciphertext.split_at(GCM_NONCE_SIZE);
    let nonce = Nonce::from_slice(iv);

    let plaintext = match key.len() {
        16 => Aes128Gcm::new_from_slice(key)
            .expect("key length checked")
            .decrypt(nonce, body),
        24 => Aes192Gcm::new_from_slice(key)
            .expect("key length checked")
            .decrypt(nonce, body),
        32 => Aes256Gcm::new_from_slice(key)
            .expect("key length checked")
            .decrypt(nonce, body),
        other => return Err(CryptoError::InvalidKeyLength(other)),
    };
    plaintext.map_err(|_| CryptoError::AeadFailed)
}

enum Kek {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl Kek {
    fn new(key: &[u8]) -> Result<Kek, CryptoError> {
        match key.len() {
            16 => Ok(Kek::Aes128(Aes128::new_from_slice(key).expect("key length checked"))),
            24 => Ok(Kek::Aes192(Aes192::new_from_slice(key).expect("key length checked"))),
            32 => Ok(Kek::Aes256(Aes256::new_from_slice(key).expect("key length checked"))),
            other => Err(CryptoError::InvalidKeyLength(other)),
        }
    }

    fn encrypt_block(&self, block: &mut Block) {
        match self {
            Kek::Aes128(cipher) => cipher.encrypt_block(block),
            Kek::Aes192(cipher) => cipher.encrypt_block(block),
            Kek::Aes256(cipher) => cipher.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut Block) {
        match self {
            Kek::Aes128(cipher) => cipher.decrypt_block(block),
            Kek::Aes192(cipher) => cipher.decrypt_block(block),
            Kek::Aes256(cipher) => cipher.decrypt_block(block),
        }
    }
}

/// RFC 3394 AES key unwrap: 6 rounds, integrity sentinel `0xA6A6A6A6A6A6A6A6`.
///
/// # Errors
///
/// [`CryptoError::IntegrityCheckFailed`] when the sentinel does not verify, meaning the wrapped
/// key was tampered with or the wrong KEK was used.
pub fn unwrap_aes_key(wrapped_key: &[u8], kek: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if wrapped_key.len() % 8 != 0 || wrapped_key.len() < 16 {
        return Err(CryptoError::InvalidWrappedKeyLength(wrapped_key.len()));
    }
    let n = wrapped_key.len() / 8 - 1;
    let cipher = Kek::new(kek)?;

    let mut a = u64::from_be_bytes(wrapped_key[..8].try_into().expect("8-byte slice"));
    let mut r = wrapped_key[8..].to_vec();

    for j in (0..=5).rev() {
        for i in (1..=n).rev() {
            let t = (n * j + i) as u64;
            let offset = (i - 1) * 8;

            let mut block = Block::default();
            block[..8].copy_from_slice(&(a ^ t).to_be_bytes());
            block[8..].copy_from_slice(&r[offset..offset + 8]);
            cipher.decrypt_block(&mut block);

            a = u64::from_be_bytes(block[..8].try_into().expect("8-byte slice"));
            r[offset..offset + 8].copy_from_slice(&block[8..]);
        }
    }

    if a != KEY_WRAP_IV {
        return Err(CryptoError::IntegrityCheckFailed);
    }
    Ok(r)
}

/// RFC 3394 AES key wrap, the exact inverse of [`unwrap_aes_key`].
pub fn wrap_aes_key(key_data: &[u8], kek: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key_data.len() % 8 != 0 || key_data.len() < 8 {
        return Err(CryptoError::InvalidWrappedKeyLength(key_data.len()));
    }
    let n = key_data.len() / 8;
    let cipher = Kek::new(kek)?;

    let mut a = KEY_WRAP_IV;
    let mut r = key_data.to_vec();

    for j in 0..=5 {
        for i in 1..=n {
            let t = (n * j + i) as u64;
            let offset = (i - 1) * 8;

            let mut block = Block::default();
            block[..8].copy_from_slice(&a.to_be_bytes());
            block[8..].copy_from_slice(&r[offset..offset + 8]);
            cipher.encrypt_block(&mut block);

            a = u64::from_be_bytes(block[..8].try_into().expect("8-byte slice")) ^ t;
            r[offset..offset + 8].copy_from_slice(&block[8..]);
        }
    }

    let mut wrapped = Vec::with_capacity(8 + r.len());
    wrapped.extend_from_slice(&a.to_be_bytes());
    wrapped.extend_from_slice(&r);
    Ok(wrapped)
}
