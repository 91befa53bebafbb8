//! Data types shared between the transport, store, evaluator, and sync engine.
//!
//! All types serialize with camelCase field names matching the server's JSON wire format. Byte
//! fields (`payload`, `wrappedDek`) serialize as base64 strings.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

#[allow(missing_docs)]
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Map from namespace to the opaque cursor last observed for it.
///
/// Cursors totally order observed updates within a namespace; the client never parses or compares
/// them. An absent entry means no data has been observed yet.
pub type Cursors = HashMap<String, String>;

/// The comparison operator of a rule [`Condition`].
///
/// Unknown operators received from the server are preserved (and fail every condition they appear
/// in) rather than failing deserialization of the whole family.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Operator {
    #[allow(missing_docs)]
    #[serde(rename = "EQUALS")]
    Equals,
    #[allow(missing_docs)]
    #[serde(rename = "NOT_EQUALS")]
    NotEquals,
    #[allow(missing_docs)]
    #[serde(rename = "IN")]
    In,
    #[allow(missing_docs)]
    #[serde(rename = "NOT_IN")]
    NotIn,
    #[allow(missing_docs)]
    #[serde(rename = "CONTAINS")]
    Contains,
    #[allow(missing_docs)]
    #[serde(rename = "GREATER_THAN")]
    GreaterThan,
    #[allow(missing_docs)]
    #[serde(rename = "LESS_THAN")]
    LessThan,
    /// Percentage rollout: hashes the attribute value into a bucket in `[0, 100)` and matches when
    /// the bucket is below the configured threshold.
    #[serde(rename = "SPLIT")]
    Split,
    /// Operator not known to this client version.
    #[serde(untagged)]
    Unknown(String),
}

/// A single predicate over the evaluation attributes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// The attribute to look up in the evaluation context.
    pub variable: String,
    /// The comparison to apply.
    pub operator: Operator,
    /// Operands; arity depends on the operator.
    pub values: Vec<String>,
}

/// A rollout rule. Matches iff every condition matches.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Human-readable description, if any.
    #[serde(default)]
    pub description: Option<String>,
    #[allow(missing_docs)]
    pub conditions: Vec<Condition>,
    /// The fig version served when this rule matches.
    pub target_version: String,
}

/// Immutable identity and metadata of a configuration.
///
/// Identity of a [`FigFamily`] is `(namespace, key)`; `key` is unique within a namespace.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FigDefinition {
    #[allow(missing_docs)]
    pub namespace: String,
    #[allow(missing_docs)]
    pub key: String,
    #[allow(missing_docs)]
    pub fig_id: String,
    #[allow(missing_docs)]
    pub schema_uri: String,
    #[allow(missing_docs)]
    pub schema_version: String,
    #[allow(missing_docs)]
    pub created_at: Timestamp,
    #[allow(missing_docs)]
    pub updated_at: Timestamp,
}

/// A single version of a configuration.
///
/// When `is_encrypted` is set, `payload` holds `IV(12) || ciphertext || tag(16)` and
/// `wrapped_dek` holds the RFC 3394-wrapped data encryption key.
#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Fig {
    #[allow(missing_docs)]
    pub fig_id: String,
    #[allow(missing_docs)]
    pub version: String,
    #[allow(missing_docs)]
    #[serde_as(as = "Base64")]
    pub payload: Vec<u8>,
    /// Whether the payload is envelope-encrypted.
    #[serde(default)]
    pub is_encrypted: bool,
    /// The wrapped per-fig data encryption key; non-empty whenever `is_encrypted`.
    #[serde_as(as = "Option<Base64>")]
    #[serde(default)]
    pub wrapped_dek: Option<Vec<u8>>,
    /// Identifies which namespace key wraps the DEK, when the namespace has several.
    #[serde(default)]
    pub key_id: Option<String>,
}

/// The versioned bundle for one `(namespace, key)`: all versions, rollout rules, and an optional
/// default version.
///
/// Rule order is significant: the first matching rule wins. A `target_version` or
/// `default_version` that resolves to no fig is an evaluation-time error, not an ingest error.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FigFamily {
    #[allow(missing_docs)]
    pub definition: FigDefinition,
    #[allow(missing_docs)]
    pub figs: Vec<Fig>,
    #[allow(missing_docs)]
    pub rules: Vec<Rule>,
    /// Version served when no rule matches.
    #[serde(default)]
    pub default_version: Option<String>,
}

/// Request body for `POST /data/initial`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitialFetchRequest {
    #[allow(missing_docs)]
    pub namespace: String,
    #[allow(missing_docs)]
    pub environment_id: String,
    /// Reproducible bootstrap: fetch state as of this instant.
    #[serde(default)]
    pub as_of_timestamp: Option<Timestamp>,
}

/// Response body for `POST /data/initial`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitialFetchResponse {
    #[allow(missing_docs)]
    pub fig_families: Vec<FigFamily>,
    #[allow(missing_docs)]
    pub cursor: String,
    #[allow(missing_docs)]
    pub environment_id: String,
}

/// Request body for `POST /data/updates`.
///
/// An empty cursor is valid and asks the server for full state.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFetchRequest {
    #[allow(missing_docs)]
    pub namespace: String,
    #[allow(missing_docs)]
    pub cursor: String,
    #[allow(missing_docs)]
    pub environment_id: String,
}

/// Response body for `POST /data/updates`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFetchResponse {
    #[allow(missing_docs)]
    pub fig_families: Vec<FigFamily>,
    #[allow(missing_docs)]
    pub cursor: String,
}

/// A namespace wrapping key as returned by `GET /keys/namespace/{namespace}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceKey {
    /// Base64-encoded, RSA-OAEP-encrypted AES wrapping key.
    pub wrapped_key: String,
    #[allow(missing_docs)]
    pub key_id: String,
}

/// A client public key registered with the server via `PUT /keys/public`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserPublicKey {
    #[allow(missing_docs)]
    pub email: String,
    #[allow(missing_docs)]
    pub public_key: String,
    #[allow(missing_docs)]
    pub algorithm: String,
}
