use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::{BootstrapResult, BootstrapStrategy};
use crate::vault::VaultService;
use crate::Result;

/// Bootstraps from the encrypted vault backup.
///
/// The backup's sync token seeds the cursor for every requested namespace and every namespace
/// observed in the backup items; only items in requested namespaces are returned.
pub struct VaultStrategy {
    vault: Arc<VaultService>,
}

impl VaultStrategy {
    #[allow(missing_docs)]
    pub fn new(vault: Arc<VaultService>) -> Self {
        VaultStrategy { vault }
    }
}

#[async_trait]
impl BootstrapStrategy for VaultStrategy {
    async fn bootstrap(&self, namespaces: &[String]) -> Result<BootstrapResult> {
        let payload = self.vault.load_backup().await?;

        let mut result = BootstrapResult::default();
        if !payload.sync_token.is_empty() {
            for namespace in namespaces {
                result
                    .cursors
                    .insert(namespace.clone(), payload.sync_token.clone());
            }
            for item in &payload.items {
                result
                    .cursors
                    .entry(item.definition.namespace.clone())
                    .or_insert_with(|| payload.sync_token.clone());
            }
        }

        let requested: HashSet<&str> = namespaces.iter().map(String::as_str).collect();
        result.fig_families = payload
            .items
            .into_iter()
            .filter(|item| requested.contains(item.definition.namespace.as_str()))
            .collect();

        Ok(result)
    }
}
