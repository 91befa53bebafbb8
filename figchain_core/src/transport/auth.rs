use std::path::Path;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;

use crate::{Error, Result};

/// Provides the bearer token attached to every server call.
///
/// Called on each request; implementations may mint short-lived tokens.
pub trait TokenProvider: Send + Sync {
    #[allow(missing_docs)]
    fn token(&self) -> Result<String>;
}

/// Emits a static client secret as the bearer token.
pub struct SharedSecretTokenProvider {
    client_secret: String,
}

impl SharedSecretTokenProvider {
    #[allow(missing_docs)]
    pub fn new(client_secret: impl Into<String>) -> Self {
        SharedSecretTokenProvider {
            client_secret: client_secret.into(),
        }
    }
}

impl TokenProvider for SharedSecretTokenProvider {
    fn token(&self) -> Result<String> {
        Ok(self.client_secret.clone())
    }
}

const TOKEN_TTL_SECS: i64 = 10 * 60;

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    sub: &'a str,
    exp: i64,
    iat: i64,
    nbf: i64,
    tenant_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

/// Signs a short-lived RS256 JWT with a service-account private key on every call.
///
/// Claims: `iss = sub = service_account_id`, `exp = now + 10min`, `iat = nbf = now`,
/// `tenant_id`, and `namespace` when the token is namespace-scoped. The header carries `kid`
/// when a key id is known.
pub struct PrivateKeyTokenProvider {
    encoding_key: EncodingKey,
    service_account_id: String,
    tenant_id: String,
    namespace: Option<String>,
    key_id: Option<String>,
}

impl PrivateKeyTokenProvider {
    /// Load the signing key from a PEM file (PKCS#8 or PKCS#1).
    pub fn from_pem_file(
        path: impl AsRef<Path>,
        service_account_id: impl Into<String>,
        tenant_id: impl Into<String>,
        namespace: Option<String>,
        key_id: Option<String>,
    ) -> Result<Self> {
        let pem = std::fs::read(path.as_ref())?;
        Self::from_pem(&pem, service_account_id, tenant_id, namespace, key_id)
    }

    /// Build a provider from PEM-encoded key bytes.
    pub fn from_pem(
        pem: &[u8],
        service_account_id: impl Into<String>,
        tenant_id: impl Into<String>,
        namespace: Option<String>,
        key_id: Option<String>,
    ) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(pem)
            .map_err(|err| Error::Auth(format!("failed to parse signing key: {err}")))?;
        Ok(PrivateKeyTokenProvider {
            encoding_key,
            service_account_id: service_account_id.into(),
            tenant_id: tenant_id.into(),
            namespace: namespace.filter(|ns| !ns.is_empty()),
            key_id: key_id.filter(|kid| !kid.is_empty()),
        })
    }
}

impl TokenProvider for PrivateKeyTokenProvider {
    fn token(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &self.service_account_id,
            sub: &self.service_account_id,
            exp: now + TOKEN_TTL_SECS,
            iat: now,
            nbf: now,
            tenant_id: &self.tenant_id,
            namespace: self.namespace.as_deref(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();

        jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|err| Error::Auth(format!("failed to sign token: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use rand::rngs::OsRng;
    use rsa::pkcs8::EncodePrivateKey;
    use rsa::RsaPrivateKey;

    use super::{PrivateKeyTokenProvider, SharedSecretTokenProvider, TokenProvider};

    #[test]
    fn shared_secret_is_emitted_verbatim() {
        let provider = SharedSecretTokenProvider::new("super-secret");
        assert_eq!(provider.token().unwrap(), "super-secret");
    }

    fn decode_segment(segment: &str) -> serde_json::Value {
        let bytes = URL_SAFE_NO_PAD.decode(segment).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn jwt_carries_the_expected_claims() {
        let key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let pem = key.to_pkcs8_pem(Default::default()).unwrap();
        let provider = PrivateKeyTokenProvider::from_pem(
            pem.as_bytes(),
            "svc-1",
            "tenant-1",
            Some("payments".to_owned()),
            Some("kid-1".to_owned()),
        )
        .unwrap();

        let token = provider.token().unwrap();
        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);

        let header = decode_segment(segments[0]);
        assert_eq!(header["alg"], "RS256");
        assert_eq!(header["kid"], "kid-1");

        let claims = decode_segment(segments[1]);
        assert_eq!(claims["iss"], "svc-1");
        assert_eq!(claims["sub"], "svc-1");
        assert_eq!(claims["tenant_id"], "tenant-1");
        assert_eq!(claims["namespace"], "payments");
        let iat = claims["iat"].as_i64().unwrap();
        assert_eq!(claims["nbf"].as_i64().unwrap(), iat);
        assert_eq!(claims["exp"].as_i64().unwrap(), iat + 600);
    }

    #[test]
    fn jwt_omits_namespace_and_kid_when_unset() {
        let key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let pem = key.to_pkcs8_pem(Default::default()).unwrap();
        let provider =
            PrivateKeyTokenProvider::from_pem(pem.as_bytes(), "svc-1", "tenant-1", None, None)
                .unwrap();

        let token = provider.token().unwrap();
        let segments: Vec<&str> = token.split('.').collect();

        let header = decode_segment(segments[0]);
        assert!(header.get("kid").is_none() || header["kid"].is_null());

        let claims = decode_segment(segments[1]);
        assert!(claims.get("namespace").is_none());
    }

    #[test]
    fn non_rsa_pem_is_rejected() {
        let result = PrivateKeyTokenProvider::from_pem(b"garbage", "svc", "tenant", None, None);
        assert!(result.is_err());
    }
}
