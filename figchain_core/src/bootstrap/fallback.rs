use std::sync::Arc;

use async_trait::async_trait;

use super::{BootstrapResult, BootstrapStrategy};
use crate::{Error, Result};

/// Tries the server first, falling back to the vault if the server fails. When both fail, the
/// combined error preserves the server cause.
pub struct FallbackStrategy {
    server: Arc<dyn BootstrapStrategy>,
    vault: Arc<dyn BootstrapStrategy>,
}

impl FallbackStrategy {
    #[allow(missing_docs)]
    pub fn new(server: Arc<dyn BootstrapStrategy>, vault: Arc<dyn BootstrapStrategy>) -> Self {
        FallbackStrategy { server, vault }
    }
}

#[async_trait]
impl BootstrapStrategy for FallbackStrategy {
    async fn bootstrap(&self, namespaces: &[String]) -> Result<BootstrapResult> {
        let server_err = match self.server.bootstrap(namespaces).await {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };

        log::warn!(target: "figchain",
            "server bootstrap failed: {server_err}; falling back to vault");

        match self.vault.bootstrap(namespaces).await {
            Ok(result) => Ok(result),
            Err(vault_err) => Err(Error::BootstrapFailed {
                server: Box::new(server_err),
                vault: Box::new(vault_err),
            }),
        }
    }
}
