use std::sync::Arc;

use crate::crypto::CryptoError;

/// Result type used throughout the FigChain client.
///
/// This is a standard Rust `Result` where the error variant is the figchain-specific [`Error`]
/// enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the FigChain client.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The client was constructed with invalid or incomplete configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Invalid base_url configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// The server returned a non-2xx response.
    #[error("server returned {status} from {endpoint}: {body}")]
    Transport {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
        /// The endpoint that produced the response.
        endpoint: String,
    },

    /// Network-level failure talking to the server.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// Failed to encode or decode a wire or payload value.
    #[error("codec error: {0}")]
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    Codec(#[source] Arc<serde_json::Error>),

    /// Error evaluating rollout rules.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Error in the envelope decryption pipeline.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The namespace has no wrapping key registered.
    #[error("no keys found for namespace {namespace}")]
    NamespaceKeyNotFound {
        /// The namespace that was queried.
        namespace: String,
    },

    /// The namespace has multiple wrapping keys and the fig does not name one.
    #[error("namespace {namespace} has {count} keys but the fig has no keyId; cannot determine which key to use")]
    AmbiguousNamespaceKey {
        /// The namespace that was queried.
        namespace: String,
        /// Number of keys returned by the server.
        count: usize,
    },

    /// No fig family is stored under the requested key.
    #[error("fig not found: {key}")]
    FigNotFound {
        /// The requested key.
        key: String,
    },

    /// Evaluation produced no fig: no rule matched and no default version is set.
    #[error("no matching fig found for key: {key}")]
    NoMatchingFig {
        /// The requested key.
        key: String,
    },

    /// The fig is encrypted but no encryption private key was configured.
    #[error("fig is encrypted but no encryption private key is configured")]
    EncryptionNotConfigured,

    /// The vault backup source is disabled by configuration.
    #[error("vault is not enabled")]
    VaultDisabled,

    /// Both the server and the vault bootstrap failed.
    #[error("both server and vault bootstrap failed; server: {server}; vault: {vault}")]
    BootstrapFailed {
        /// The error from the server strategy.
        server: Box<Error>,
        /// The error from the vault strategy.
        vault: Box<Error>,
    },

    /// Failed to obtain an authentication token.
    #[error("failed to get auth token: {0}")]
    Auth(String),

    /// The operation was cancelled or its deadline expired.
    #[error("operation cancelled")]
    Cancelled,

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Codec(Arc::new(value))
    }
}

/// Errors that can occur while evaluating rollout rules against a fig family.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EvaluationError {
    /// A rule's target version (or the default version) does not resolve to any fig.
    #[error("fig version {version} not found")]
    FigVersionMissing {
        /// The version that failed to resolve.
        version: String,
    },
}
