use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::{BootstrapResult, BootstrapStrategy};
use crate::model::UpdateFetchRequest;
use crate::transport::Transport;
use crate::Result;

/// Bootstraps from the vault, fetches namespaces the vault did not cover from the server, and
/// catches vault-seeded namespaces up to the present via `fetch_update`.
///
/// Partial failure is tolerated everywhere past the vault read: a failed server fetch or a failed
/// per-namespace catch-up is logged and the bootstrap proceeds with what is available.
pub struct HybridStrategy {
    vault: Arc<dyn BootstrapStrategy>,
    server: Arc<dyn BootstrapStrategy>,
    transport: Arc<dyn Transport>,
    environment_id: String,
}

impl HybridStrategy {
    #[allow(missing_docs)]
    pub fn new(
        vault: Arc<dyn BootstrapStrategy>,
        server: Arc<dyn BootstrapStrategy>,
        transport: Arc<dyn Transport>,
        environment_id: impl Into<String>,
    ) -> Self {
        HybridStrategy {
            vault,
            server,
            transport,
            environment_id: environment_id.into(),
        }
    }
}

#[async_trait]
impl BootstrapStrategy for HybridStrategy {
    async fn bootstrap(&self, namespaces: &[String]) -> Result<BootstrapResult> {
        // 1. Vault first; a failed vault read degrades to an empty result.
        let mut result = match self.vault.bootstrap(namespaces).await {
            Ok(result) => result,
            Err(err) => {
                log::warn!(target: "figchain",
                    "vault bootstrap failed: {err}; continuing with server only");
                BootstrapResult::default()
            }
        };

        // 2. Namespaces the vault had no cursor for need a full server fetch.
        let missing: Vec<String> = namespaces
            .iter()
            .filter(|ns| !result.cursors.contains_key(*ns))
            .cloned()
            .collect();

        if !missing.is_empty() {
            log::debug!(target: "figchain",
                "fetching namespaces missing from vault: {missing:?}");
            match self.server.bootstrap(&missing).await {
                Ok(server_result) => {
                    result.fig_families.extend(server_result.fig_families);
                    result.cursors.extend(server_result.cursors);
                }
                Err(err) => {
                    log::warn!(target: "figchain",
                        "server fetch for missing namespaces failed: {err}; proceeding with vault data");
                }
            }
        }

        // 3. Catch vault-seeded namespaces up to the present.
        let missing_set: HashSet<&str> = missing.iter().map(String::as_str).collect();
        for namespace in namespaces {
            if missing_set.contains(namespace.as_str()) {
                continue;
            }
            let Some(cursor) = result.cursors.get(namespace).cloned() else {
                continue;
            };

            let req = UpdateFetchRequest {
                namespace: namespace.clone(),
                cursor,
                environment_id: self.environment_id.clone(),
            };
            match self.transport.fetch_update(&req).await {
                Ok(resp) => {
                    result.fig_families.extend(resp.fig_families);
                    if !resp.cursor.is_empty() {
                        result.cursors.insert(namespace.clone(), resp.cursor);
                    }
                }
                Err(err) => {
                    log::warn!(target: "figchain",
                        "catch-up for namespace {namespace} failed: {err}");
                }
            }
        }

        Ok(result)
    }
}
