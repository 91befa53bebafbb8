use std::sync::Arc;

use async_trait::async_trait;

use super::{BootstrapResult, BootstrapStrategy};
use crate::model::{InitialFetchRequest, Timestamp};
use crate::transport::Transport;
use crate::Result;

/// Bootstraps from the FigChain API: one `fetch_initial` call per namespace.
pub struct ServerStrategy {
    transport: Arc<dyn Transport>,
    environment_id: String,
    as_of: Option<Timestamp>,
}

impl ServerStrategy {
    /// Create a server strategy. `as_of` is an optional RFC-3339 timestamp for reproducible
    /// bootstraps; invalid values are logged and ignored.
    pub fn new(transport: Arc<dyn Transport>, environment_id: impl Into<String>, as_of: &str) -> Self {
        let as_of = if as_of.is_empty() {
            None
        } else {
            match chrono::DateTime::parse_from_rfc3339(as_of) {
                Ok(parsed) => Some(parsed.with_timezone(&chrono::Utc)),
                Err(err) => {
                    log::warn!(target: "figchain",
                        "invalid as_of_timestamp {as_of:?} ignored: {err}");
                    None
                }
            }
        };
        ServerStrategy {
            transport,
            environment_id: environment_id.into(),
            as_of,
        }
    }
}

#[async_trait]
impl BootstrapStrategy for ServerStrategy {
    async fn bootstrap(&self, namespaces: &[String]) -> Result<BootstrapResult> {
        let mut result = BootstrapResult::default();

        for namespace in namespaces {
            let req = InitialFetchRequest {
                namespace: namespace.clone(),
                environment_id: self.environment_id.clone(),
                as_of_timestamp: self.as_of,
            };
            let resp = self.transport.fetch_initial(&req).await?;

            log::debug!(target: "figchain",
                "bootstrap: fetched {} families for namespace {namespace}, cursor {:?}",
                resp.fig_families.len(), resp.cursor);

            result.fig_families.extend(resp.fig_families);
            if !resp.cursor.is_empty() {
                result.cursors.insert(namespace.clone(), resp.cursor);
            }
        }

        Ok(result)
    }
}
