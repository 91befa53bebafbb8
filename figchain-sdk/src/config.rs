use std::path::PathBuf;
use std::time::Duration;

use figchain_core::{Error, Result};

/// How [`Client::new`](crate::Client::new) hydrates local state on startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapStrategyKind {
    /// Fetch initial state from the server, one call per namespace.
    #[default]
    Server,
    /// Try the server first; fall back to the vault backup if the server fails.
    ServerFirst,
    /// Load only the vault backup.
    Vault,
    /// Load the vault backup, fetch namespaces it did not cover from the server, and catch the
    /// rest up via updates.
    Hybrid,
}

/// Configuration for [`Client`](crate::Client).
///
/// # Examples
/// ```
/// # use figchain::ClientConfig;
/// let config = ClientConfig::new("https://app.figchain.io/api/", "env-prod")
///     .client_secret("secret")
///     .namespaces(["payments", "checkout"])
///     .polling_interval(std::time::Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) base_url: String,
    pub(crate) environment_id: String,
    pub(crate) tenant_id: String,
    pub(crate) namespaces: Vec<String>,
    pub(crate) client_secret: String,
    pub(crate) auth_private_key_path: Option<PathBuf>,
    pub(crate) auth_client_id: String,
    pub(crate) polling_interval: Duration,
    pub(crate) use_long_polling: bool,
    pub(crate) as_of_timestamp: String,
    pub(crate) bootstrap_strategy: BootstrapStrategyKind,
    pub(crate) vault_enabled: bool,
    pub(crate) vault_bucket: String,
    pub(crate) vault_prefix: String,
    pub(crate) vault_region: String,
    pub(crate) vault_endpoint: Option<String>,
    pub(crate) vault_path_style: bool,
    pub(crate) vault_private_key_path: Option<PathBuf>,
    pub(crate) encryption_private_key_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Default sync cadence and error backoff.
    pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(60);

    /// Create a configuration for the given server endpoint and environment.
    pub fn new(base_url: impl Into<String>, environment_id: impl Into<String>) -> Self {
        ClientConfig {
            base_url: base_url.into(),
            environment_id: environment_id.into(),
            tenant_id: String::new(),
            namespaces: Vec::new(),
            client_secret: String::new(),
            auth_private_key_path: None,
            auth_client_id: String::new(),
            polling_interval: ClientConfig::DEFAULT_POLLING_INTERVAL,
            use_long_polling: true,
            as_of_timestamp: String::new(),
            bootstrap_strategy: BootstrapStrategyKind::default(),
            vault_enabled: false,
            vault_bucket: String::new(),
            vault_prefix: String::new(),
            vault_region: String::new(),
            vault_endpoint: None,
            vault_path_style: false,
            vault_private_key_path: None,
            encryption_private_key_path: None,
        }
    }

    /// Tenant identifier, included as the `tenant_id` claim in private-key auth tokens.
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    /// The namespaces to track.
    pub fn namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    /// Authenticate with a shared client secret.
    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = secret.into();
        self
    }

    /// Authenticate by signing JWTs with a service-account private key (PEM, PKCS#8 or PKCS#1).
    /// Restricted to a single configured namespace.
    pub fn auth_private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.auth_private_key_path = Some(path.into());
        self
    }

    /// Service-account id for private-key auth; the environment id is used when unset.
    pub fn auth_client_id(mut self, id: impl Into<String>) -> Self {
        self.auth_client_id = id.into();
        self
    }

    /// Sync cadence in interval mode; error backoff in both modes. Defaults to
    /// [`ClientConfig::DEFAULT_POLLING_INTERVAL`].
    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    /// Switch between long polling (default) and interval polling.
    pub fn use_long_polling(mut self, enable: bool) -> Self {
        self.use_long_polling = enable;
        self
    }

    /// RFC-3339 timestamp for reproducible bootstraps. Invalid values are logged and ignored.
    pub fn as_of_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.as_of_timestamp = timestamp.into();
        self
    }

    /// Select the bootstrap data source. Vault-dependent strategies require the vault to be
    /// enabled; otherwise the server strategy is used and a warning is logged.
    pub fn bootstrap_strategy(mut self, strategy: BootstrapStrategyKind) -> Self {
        self.bootstrap_strategy = strategy;
        self
    }

    /// Enable the vault backup source.
    pub fn vault_enabled(mut self, enabled: bool) -> Self {
        self.vault_enabled = enabled;
        self
    }

    /// S3 bucket holding vault backups.
    pub fn vault_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.vault_bucket = bucket.into();
        self
    }

    /// Object key prefix inside the vault bucket.
    pub fn vault_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.vault_prefix = prefix.into();
        self
    }

    /// AWS region of the vault bucket.
    pub fn vault_region(mut self, region: impl Into<String>) -> Self {
        self.vault_region = region.into();
        self
    }

    /// Custom endpoint for S3-compatible stores (e.g. MinIO).
    pub fn vault_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.vault_endpoint = Some(endpoint.into());
        self
    }

    /// Use path-style object addressing with a custom endpoint.
    pub fn vault_path_style(mut self, enabled: bool) -> Self {
        self.vault_path_style = enabled;
        self
    }

    /// PEM private key used to decrypt vault backups.
    pub fn vault_private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.vault_private_key_path = Some(path.into());
        self
    }

    /// PEM private key used for per-fig envelope decryption. Without it, encrypted figs fail
    /// with [`Error::EncryptionNotConfigured`](figchain_core::Error::EncryptionNotConfigured).
    pub fn encryption_private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.encryption_private_key_path = Some(path.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(Error::InvalidConfiguration("base_url is required".to_owned()));
        }
        if self.environment_id.is_empty() {
            return Err(Error::InvalidConfiguration(
                "environment_id is required".to_owned(),
            ));
        }
        if self.client_secret.is_empty() && self.auth_private_key_path.is_none() {
            return Err(Error::InvalidConfiguration(
                "an authentication method must be configured: provide a client_secret or an auth_private_key_path".to_owned(),
            ));
        }
        if self.auth_private_key_path.is_some() && self.namespaces.len() > 1 {
            return Err(Error::InvalidConfiguration(
                "private key authentication can only be used with a single namespace".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BootstrapStrategyKind, ClientConfig};
    use figchain_core::Error;

    fn valid() -> ClientConfig {
        ClientConfig::new("https://figchain.test/api/", "env-1").client_secret("secret")
    }

    #[test]
    fn valid_config_passes() {
        valid().validate().unwrap();
    }

    #[test]
    fn base_url_is_required() {
        let err = ClientConfig::new("", "env-1")
            .client_secret("secret")
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(msg) if msg.contains("base_url")));
    }

    #[test]
    fn environment_id_is_required() {
        let err = ClientConfig::new("https://figchain.test/", "")
            .client_secret("secret")
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(msg) if msg.contains("environment_id")));
    }

    #[test]
    fn an_auth_method_is_required() {
        let err = ClientConfig::new("https://figchain.test/", "env-1")
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(msg) if msg.contains("authentication")));
    }

    #[test]
    fn private_key_auth_requires_a_single_namespace() {
        let err = ClientConfig::new("https://figchain.test/", "env-1")
            .auth_private_key_path("/tmp/key.pem")
            .namespaces(["ns1", "ns2"])
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(msg) if msg.contains("single namespace")));
    }

    #[test]
    fn defaults_match_the_documented_table() {
        let config = valid();
        assert_eq!(config.polling_interval, ClientConfig::DEFAULT_POLLING_INTERVAL);
        assert!(config.use_long_polling);
        assert!(!config.vault_enabled);
        assert_eq!(config.bootstrap_strategy, BootstrapStrategyKind::Server);
    }
}
