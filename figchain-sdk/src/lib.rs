//! The Rust SDK for FigChain, a remote configuration-management service.
//!
//! # Overview
//!
//! The SDK revolves around a [`Client`] that keeps one or more configuration namespaces in sync
//! with the FigChain server and serves strongly typed configuration values ("figs"). Values may
//! be gated by rollout rules evaluated against per-request attributes, and payloads may be
//! encrypted end-to-end with per-namespace key wrapping; decryption is applied transparently on
//! read.
//!
//! # Getting figs
//!
//! [`Client::new`] bootstraps local state (from the server, an encrypted vault backup, or a
//! combination — see [`BootstrapStrategyKind`]) and starts a background sync engine that keeps it
//! current. [`Client::get_fig`] then evaluates the rollout rules for a key against an
//! [`EvaluationContext`] and decodes the winning version's payload into your type:
//!
//! ```no_run
//! # async fn example() -> figchain::Result<()> {
//! use figchain::{Client, ClientConfig, EvaluationContext};
//!
//! #[derive(serde::Deserialize)]
//! struct DbConfig {
//!     max_connections: u32,
//! }
//!
//! let client = Client::new(
//!     ClientConfig::new("https://app.figchain.io/api/", "env-prod")
//!         .client_secret("secret")
//!         .namespaces(["payments"]),
//! )
//! .await?;
//!
//! let ctx = EvaluationContext::new(
//!     [("user_id".to_owned(), "123".to_owned())].into_iter().collect(),
//! );
//! let db: DbConfig = client.get_fig("db-config", &ctx).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Watching for changes
//!
//! [`Client::watch`] returns a latest-wins stream of family updates for a key;
//! [`Client::register_listener`] invokes a callback with freshly decoded values. Listeners are
//! evaluated with empty attributes and are meant for server-scoped configuration only.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. `get_fig` returns decryption failures to the
//! caller; listeners log and swallow them, so a listener only ever observes decodable values.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages.
//! Consider integrating a `log`-compatible logger implementation for better visibility into SDK
//! operations.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod client;
mod config;

#[doc(inline)]
pub use figchain_core::{
    eval::{Attributes, EvaluationContext},
    model,
    sync::FigWatcher,
    transport::Transport,
    Error, EvaluationError, Result,
};

pub use client::Client;
pub use config::{BootstrapStrategyKind, ClientConfig};
