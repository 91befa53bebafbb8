//! The background sync engine: advances per-namespace cursors against the server and fans
//! updates out to the store, watchers, and typed listeners.
//!
//! Exactly one engine task runs per client. Watcher notification happens while the registry
//! write lock is held, but sends are non-blocking (latest-wins channels), so the sync loop's
//! latency is independent of watcher health. Typed listener callbacks run on the sync task after
//! the lock is released, in applied order; they should do short, non-blocking work.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::model::{Cursors, FigFamily, UpdateFetchRequest, UpdateFetchResponse};
use crate::store::FigStore;
use crate::transport::Transport;

/// A stored typed-listener callback: receives the updated family, performs its own evaluation
/// and decoding, and swallows its own errors.
pub type ListenerCallback = Arc<dyn Fn(Arc<FigFamily>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Configuration for the [`SyncEngine`].
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Sync cadence in interval mode; error backoff in both modes.
    pub polling_interval: Duration,
    /// Long polling issues requests back-to-back and lets the server block until updates exist;
    /// interval polling sleeps between sweeps.
    pub use_long_polling: bool,
    #[allow(missing_docs)]
    pub environment_id: String,
}

impl SyncEngineConfig {
    /// Default value for [`SyncEngineConfig::polling_interval`].
    pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(60);
}

/// Shared synchronization state: the store plus cursors, watcher registrations, and typed
/// listeners behind a single writer lock.
pub struct SyncState {
    store: Arc<FigStore>,
    registry: RwLock<Registry>,
}

#[derive(Default)]
struct Registry {
    cursors: Cursors,
    watchers: HashMap<String, Vec<WatchSlot>>,
    listeners: HashMap<String, Vec<ListenerCallback>>,
    next_watch_id: u64,
}

struct WatchSlot {
    id: u64,
    sender: watch::Sender<Option<Arc<FigFamily>>>,
}

impl SyncState {
    #[allow(missing_docs)]
    pub fn new(store: Arc<FigStore>) -> Self {
        SyncState {
            store,
            registry: RwLock::new(Registry::default()),
        }
    }

    #[allow(missing_docs)]
    pub fn store(&self) -> &Arc<FigStore> {
        &self.store
    }

    /// Seed the store and cursor map from a bootstrap result. Called once, before the engine
    /// starts.
    pub fn seed(&self, families: Vec<FigFamily>, cursors: Cursors) {
        for family in families {
            self.store.put(family);
        }
        let mut registry = self.write_registry();
        registry.cursors.extend(cursors);
    }

    /// Snapshot of the cursor map.
    pub fn cursors(&self) -> Cursors {
        self.read_registry().cursors.clone()
    }

    /// Register a watcher for updates to `key`. Returns the subscription id used for
    /// [`SyncState::unsubscribe`].
    pub fn subscribe(&self, key: &str) -> (u64, FigWatcher) {
        let (sender, receiver) = watch::channel(None);
        let mut registry = self.write_registry();
        let id = registry.next_watch_id;
        registry.next_watch_id += 1;
        registry
            .watchers
            .entry(key.to_owned())
            .or_default()
            .push(WatchSlot { id, sender });
        (id, FigWatcher { receiver })
    }

    /// Drop a watcher registration; its stream ends after any already-delivered value.
    pub fn unsubscribe(&self, key: &str, id: u64) {
        let mut registry = self.write_registry();
        if let Some(slots) = registry.watchers.get_mut(key) {
            slots.retain(|slot| slot.id != id);
            if slots.is_empty() {
                registry.watchers.remove(key);
            }
        }
    }

    /// Register a typed-listener callback for updates to `key`.
    pub fn add_listener(&self, key: &str, callback: ListenerCallback) {
        let mut registry = self.write_registry();
        registry
            .listeners
            .entry(key.to_owned())
            .or_default()
            .push(callback);
    }

    /// Apply an update response for `namespace`: store each family in response order
    /// (last-writer-wins), notify watchers, and advance the cursor when the response carries one.
    ///
    /// Returns the listener dispatches to run once the lock is released.
    pub fn apply_update(
        &self,
        namespace: &str,
        response: UpdateFetchResponse,
    ) -> Vec<(ListenerCallback, Arc<FigFamily>)> {
        let mut pending = Vec::new();
        let mut registry = self.write_registry();

        for family in response.fig_families {
            let family = Arc::new(family);
            self.store.put_arc(family.clone());

            let key = family.definition.key.as_str();
            if let Some(slots) = registry.watchers.get(key) {
                for slot in slots {
                    // Latest-wins: send never blocks, a slow consumer observes the most recent
                    // value only.
                    let _ = slot.sender.send(Some(family.clone()));
                }
            }
            if let Some(callbacks) = registry.listeners.get(key) {
                pending.extend(
                    callbacks
                        .iter()
                        .map(|callback| (callback.clone(), family.clone())),
                );
            }
        }

        if !response.cursor.is_empty() {
            registry
                .cursors
                .insert(namespace.to_owned(), response.cursor);
        }

        pending
    }

    fn read_registry(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        self.registry
            .read()
            .expect("thread holding sync registry lock should not panic")
    }

    fn write_registry(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.registry
            .write()
            .expect("thread holding sync registry lock should not panic")
    }
}

/// A stream of family updates for one key, delivered latest-wins.
///
/// This is not a log: when the consumer lags, intermediate updates are dropped and only the most
/// recent one is observed.
pub struct FigWatcher {
    receiver: watch::Receiver<Option<Arc<FigFamily>>>,
}

impl FigWatcher {
    /// Wait for the next update. Returns `None` once the subscription is deregistered.
    pub async fn next(&mut self) -> Option<Arc<FigFamily>> {
        loop {
            self.receiver.changed().await.ok()?;
            let value = self.receiver.borrow_and_update().clone();
            if let Some(family) = value {
                return Some(family);
            }
        }
    }
}

/// The background poll loop. Started once per client; stopped through [`SyncHandle`].
pub struct SyncEngine;

impl SyncEngine {
    /// Spawn the engine task on the current tokio runtime.
    pub fn start(
        transport: Arc<dyn Transport>,
        state: Arc<SyncState>,
        config: SyncEngineConfig,
    ) -> SyncHandle {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            run(transport, state, config, task_cancel).await;
            log::debug!(target: "figchain", "sync engine stopped");
        });
        SyncHandle {
            cancel,
            join: Mutex::new(Some(join)),
        }
    }
}

async fn run(
    transport: Arc<dyn Transport>,
    state: Arc<SyncState>,
    config: SyncEngineConfig,
    cancel: CancellationToken,
) {
    loop {
        let swept = sweep(&transport, &state, &config, &cancel).await;
        if cancel.is_cancelled() {
            return;
        }
        // Interval mode always sleeps between sweeps. Long polling relies on the server to
        // block, but still sleeps when there was nothing to poll.
        if !config.use_long_polling || !swept {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(config.polling_interval) => {}
            }
        }
    }
}

/// One pass over the cursor map. Returns whether any namespace was polled.
async fn sweep(
    transport: &Arc<dyn Transport>,
    state: &Arc<SyncState>,
    config: &SyncEngineConfig,
    cancel: &CancellationToken,
) -> bool {
    let cursors = state.cursors();
    let polled = !cursors.is_empty();

    for (namespace, cursor) in cursors {
        if cancel.is_cancelled() {
            return polled;
        }

        let req = UpdateFetchRequest {
            namespace: namespace.clone(),
            cursor,
            environment_id: config.environment_id.clone(),
        };
        let result = tokio::select! {
            _ = cancel.cancelled() => return polled,
            result = transport.fetch_update(&req) => result,
        };

        match result {
            Ok(response) => {
                if !response.fig_families.is_empty() {
                    log::debug!(target: "figchain",
                        "applying {} families for namespace {namespace}",
                        response.fig_families.len());
                }
                let pending = state.apply_update(&namespace, response);
                for (callback, family) in pending {
                    callback(family).await;
                }
            }
            Err(err) => {
                log::warn!(target: "figchain",
                    "failed to fetch updates for {namespace}: {err}");
                // Long polling has no pacing of its own; back off so a failing server doesn't
                // turn the loop tight. Interval mode already sleeps between sweeps.
                if config.use_long_polling {
                    tokio::select! {
                        _ = cancel.cancelled() => return polled,
                        _ = tokio::time::sleep(config.polling_interval) => {}
                    }
                }
            }
        }
    }

    polled
}

/// Stops the engine. Obtained from [`SyncEngine::start`].
pub struct SyncHandle {
    cancel: CancellationToken,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl SyncHandle {
    /// Signal the engine to stop without waiting for it to exit.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the engine and wait for the task to exit. Safe to call more than once; the in-flight
    /// request (or backoff sleep) is aborted.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let join = self
            .join
            .lock()
            .expect("thread holding sync handle lock should not panic")
            .take();
        if let Some(join) = join {
            // The task only ends by cancellation; a join error means it panicked.
            if join.await.is_err() {
                log::error!(target: "figchain", "sync engine task panicked");
            }
        }
    }
}
