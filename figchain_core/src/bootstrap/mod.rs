//! Startup hydration: pluggable strategies that produce the initial fig families and
//! per-namespace cursors before continuous sync begins.
use async_trait::async_trait;

use crate::model::{Cursors, FigFamily};
use crate::Result;

mod fallback;
mod hybrid;
mod server;
mod vault;

pub use fallback::FallbackStrategy;
pub use hybrid::HybridStrategy;
pub use server::ServerStrategy;
pub use vault::VaultStrategy;

/// The result of a bootstrap operation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BootstrapResult {
    #[allow(missing_docs)]
    pub fig_families: Vec<FigFamily>,
    #[allow(missing_docs)]
    pub cursors: Cursors,
}

/// A startup data source: takes the namespaces to track and returns the families and cursors to
/// seed the client with.
#[async_trait]
pub trait BootstrapStrategy: Send + Sync {
    #[allow(missing_docs)]
    async fn bootstrap(&self, namespaces: &[String]) -> Result<BootstrapResult>;
}
