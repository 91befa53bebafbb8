//! A thread-safe in-memory storage for currently synced fig families. [`FigStore`] provides
//! concurrent access for readers (e.g., fig evaluation) and writers (e.g., the background sync
//! engine).
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::model::FigFamily;

/// `FigStore` provides a thread-safe (`Sync`) mapping from `(namespace, key)` to [`FigFamily`]
/// that allows concurrent access for readers and writers.
///
/// Families are immutable once stored and can only be replaced fully; readers receive `Arc`
/// snapshots. Iteration order of [`FigStore::get_all`] is unspecified.
#[derive(Default)]
pub struct FigStore {
    families: RwLock<HashMap<(String, String), Arc<FigFamily>>>,
}

impl FigStore {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        FigStore::default()
    }

    /// Store a family, replacing any prior entry for the same `(namespace, key)`.
    pub fn put(&self, family: FigFamily) {
        self.put_arc(Arc::new(family));
    }

    /// Same as [`FigStore::put`] for an already-shared family.
    pub fn put_arc(&self, family: Arc<FigFamily>) {
        let key = (
            family.definition.namespace.clone(),
            family.definition.key.clone(),
        );
        let mut families = self
            .families
            .write()
            .expect("thread holding store lock should not panic");
        families.insert(key, family);
    }

    /// Look up the family stored under `(namespace, key)`.
    pub fn get(&self, namespace: &str, key: &str) -> Option<Arc<FigFamily>> {
        let families = self
            .families
            .read()
            .expect("thread holding store lock should not panic");
        families
            .get(&(namespace.to_owned(), key.to_owned()))
            .cloned()
    }

    /// Snapshot of all stored families.
    pub fn get_all(&self) -> Vec<Arc<FigFamily>> {
        let families = self
            .families
            .read()
            .expect("thread holding store lock should not panic");
        families.values().cloned().collect()
    }
}
