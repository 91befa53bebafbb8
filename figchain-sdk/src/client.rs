use std::sync::Arc;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use figchain_core::bootstrap::{
    BootstrapStrategy, FallbackStrategy, HybridStrategy, ServerStrategy, VaultStrategy,
};
use figchain_core::encryption::EncryptionService;
use figchain_core::eval::EvaluationContext;
use figchain_core::model::FigFamily;
use figchain_core::store::FigStore;
use figchain_core::sync::{
    FigWatcher, ListenerCallback, SyncEngine, SyncEngineConfig, SyncHandle, SyncState,
};
use figchain_core::transport::{
    HttpTransport, JsonCodec, PrivateKeyTokenProvider, SharedSecretTokenProvider, TokenProvider,
    Transport,
};
use figchain_core::vault::{HttpBackupFetcher, VaultService};
use figchain_core::{Error, Result};

use crate::config::{BootstrapStrategyKind, ClientConfig};

/// The FigChain client: bootstraps local state, keeps it synced in the background, and serves
/// strongly typed, rule-evaluated configuration values.
///
/// Create one with [`Client::new`] and keep it for the lifetime of the application; it owns the
/// background sync task until [`Client::close`] is called.
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    state: Arc<SyncState>,
    encryption: Option<Arc<EncryptionService>>,
    sync: SyncHandle,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client, bootstrap it, and start the sync engine.
    ///
    /// Fails fast on configuration errors and on bootstrap failure (no data available). After
    /// `new` returns, failures are confined to individual operations and the client keeps
    /// serving from synced data.
    pub async fn new(config: ClientConfig) -> Result<Client> {
        config.validate()?;

        let token_provider: Arc<dyn TokenProvider> = match &config.auth_private_key_path {
            Some(path) => {
                let service_account_id = if config.auth_client_id.is_empty() {
                    config.environment_id.clone()
                } else {
                    config.auth_client_id.clone()
                };
                Arc::new(PrivateKeyTokenProvider::from_pem_file(
                    path,
                    service_account_id,
                    config.tenant_id.clone(),
                    config.namespaces.first().cloned(),
                    None,
                )?)
            }
            None => Arc::new(SharedSecretTokenProvider::new(config.client_secret.clone())),
        };

        let transport = HttpTransport::new(&config.base_url, token_provider, JsonCodec)?;
        Client::with_transport(config, Arc::new(transport)).await
    }

    /// Same as [`Client::new`] with a caller-provided transport: custom wire codecs, alternative
    /// HTTP stacks, or test doubles.
    pub async fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Client> {
        config.validate()?;

        let encryption = match &config.encryption_private_key_path {
            Some(path) => Some(Arc::new(EncryptionService::new(transport.clone(), path)?)),
            None => None,
        };

        let strategy = resolve_strategy(&config, &transport)?;
        let result = strategy.bootstrap(&config.namespaces).await?;
        log::debug!(target: "figchain",
            "bootstrap complete: {} families, {} cursors",
            result.fig_families.len(), result.cursors.len());

        let state = Arc::new(SyncState::new(Arc::new(FigStore::new())));
        state.seed(result.fig_families, result.cursors);

        let sync = SyncEngine::start(
            transport.clone(),
            state.clone(),
            SyncEngineConfig {
                polling_interval: config.polling_interval,
                use_long_polling: config.use_long_polling,
                environment_id: config.environment_id.clone(),
            },
        );

        Ok(Client {
            config,
            transport,
            state,
            encryption,
            sync,
        })
    }

    /// Retrieve a configuration value for `key` and decode it into `T`.
    ///
    /// Looks the key up in the first configured namespace (the client does not disambiguate keys
    /// across namespaces; with several namespaces configured, use typed listeners per namespace
    /// or one client per namespace), evaluates the rollout rules against the context, decrypts
    /// the winning fig when needed, and JSON-decodes its payload.
    ///
    /// # Errors
    ///
    /// - [`Error::FigNotFound`] when the key has no family in the store.
    /// - [`Error::NoMatchingFig`] when no rule matches and no default version is set.
    /// - [`Error::Evaluation`] when a selected version resolves to no fig.
    /// - [`Error::EncryptionNotConfigured`] when the fig is encrypted and no encryption key was
    ///   configured. Other decryption failures are returned as-is (unlike listeners, which log
    ///   and swallow them).
    /// - [`Error::Cancelled`] when the context is cancelled or past its deadline.
    pub async fn get_fig<T: DeserializeOwned>(
        &self,
        key: &str,
        context: &EvaluationContext,
    ) -> Result<T> {
        if context.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let namespace = self.config.namespaces.first().ok_or_else(|| {
            Error::InvalidConfiguration("no namespaces configured".to_owned())
        })?;

        let family = self
            .state
            .store()
            .get(namespace, key)
            .ok_or_else(|| Error::FigNotFound { key: key.to_owned() })?;

        let fig = family
            .evaluate(context)?
            .ok_or_else(|| Error::NoMatchingFig { key: key.to_owned() })?;

        let payload = if fig.is_encrypted {
            match &self.encryption {
                Some(service) => context.run(service.decrypt(fig, namespace)).await?,
                None => return Err(Error::EncryptionNotConfigured),
            }
        } else {
            fig.payload.clone()
        };

        Ok(serde_json::from_slice(&payload)?)
    }

    /// Subscribe to family updates for `key`.
    ///
    /// The stream is latest-wins, not a log: a consumer that falls behind observes only the most
    /// recent update. When `cancel` fires, the subscription is deregistered and the stream ends.
    pub fn watch(&self, cancel: CancellationToken, key: &str) -> FigWatcher {
        let (id, watcher) = self.state.subscribe(key);

        let state = self.state.clone();
        let key = key.to_owned();
        tokio::spawn(async move {
            cancel.cancelled().await;
            state.unsubscribe(&key, id);
        });

        watcher
    }

    /// Register a callback invoked with a freshly decoded `T` whenever `key` is updated.
    ///
    /// Updates are evaluated with empty attributes, so this is for server-scoped configuration
    /// only: rules that depend on request attributes may pick the default version or no version
    /// at all. Evaluation, decryption, and decode errors are logged and swallowed; the callback
    /// only ever sees decodable values. Callbacks run on the sync task in applied order and
    /// should do short, non-blocking work.
    pub fn register_listener<T, F>(&self, key: &str, callback: F)
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let encryption = self.encryption.clone();
        let callback = Arc::new(callback);
        let listener_key = key.to_owned();

        let listener: ListenerCallback = Arc::new(move |family: Arc<FigFamily>| {
            let encryption = encryption.clone();
            let callback = callback.clone();
            let key = listener_key.clone();
            async move {
                let context = EvaluationContext::default();
                let fig = match family.evaluate(&context) {
                    Ok(Some(fig)) => fig,
                    Ok(None) => {
                        log::debug!(target: "figchain",
                            "listener for {key}: no matching fig");
                        return;
                    }
                    Err(err) => {
                        log::warn!(target: "figchain",
                            "listener evaluation failed for {key}: {err}");
                        return;
                    }
                };

                let payload = if fig.is_encrypted {
                    let Some(service) = &encryption else {
                        log::warn!(target: "figchain",
                            "listener for {key}: fig is encrypted but encryption is not configured");
                        return;
                    };
                    match service.decrypt(fig, &family.definition.namespace).await {
                        Ok(payload) => payload,
                        Err(err) => {
                            log::warn!(target: "figchain",
                                "listener decryption failed for {key}: {err}");
                            return;
                        }
                    }
                } else {
                    fig.payload.clone()
                };

                match serde_json::from_slice::<T>(&payload) {
                    Ok(value) => callback(value),
                    Err(err) => {
                        log::warn!(target: "figchain",
                            "listener decode failed for {key}: {err}");
                    }
                }
            }
            .boxed()
        });

        self.state.add_listener(key, listener);
    }

    /// Stop the sync engine and release the transport. Idempotent.
    pub async fn close(&self) -> Result<()> {
        self.sync.shutdown().await;
        self.transport.close().await
    }
}

fn resolve_strategy(
    config: &ClientConfig,
    transport: &Arc<dyn Transport>,
) -> Result<Arc<dyn BootstrapStrategy>> {
    let server = Arc::new(ServerStrategy::new(
        transport.clone(),
        config.environment_id.clone(),
        &config.as_of_timestamp,
    ));

    if !config.vault_enabled {
        if config.bootstrap_strategy != BootstrapStrategyKind::Server {
            log::warn!(target: "figchain",
                "bootstrap strategy {:?} requires the vault to be enabled; using the server strategy",
                config.bootstrap_strategy);
        }
        return Ok(server);
    }

    let fetcher = Arc::new(HttpBackupFetcher::new(
        &config.vault_bucket,
        &config.vault_prefix,
        &config.vault_region,
        config.vault_endpoint.as_deref(),
        config.vault_path_style,
    )?);
    let vault_service = Arc::new(VaultService::new(
        fetcher,
        config.vault_private_key_path.clone(),
        true,
    ));
    let vault = Arc::new(VaultStrategy::new(vault_service));

    Ok(match config.bootstrap_strategy {
        BootstrapStrategyKind::Server => server,
        BootstrapStrategyKind::ServerFirst => Arc::new(FallbackStrategy::new(server, vault)),
        BootstrapStrategyKind::Vault => vault,
        BootstrapStrategyKind::Hybrid => Arc::new(HybridStrategy::new(
            vault,
            server,
            transport.clone(),
            config.environment_id.clone(),
        )),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use figchain_core::model::{
        Fig, FigDefinition, FigFamily, InitialFetchRequest, InitialFetchResponse, NamespaceKey,
        Operator, Rule, UpdateFetchRequest, UpdateFetchResponse, UserPublicKey,
    };
    use figchain_core::transport::Transport;
    use figchain_core::{Error, Result};

    use crate::{Client, ClientConfig, EvaluationContext};

    #[derive(Default)]
    struct MockTransport {
        initial: Mutex<HashMap<String, InitialFetchResponse>>,
        updates: Mutex<HashMap<(String, String), Vec<UpdateFetchResponse>>>,
        namespace_keys: Mutex<Vec<NamespaceKey>>,
    }

    impl MockTransport {
        fn with_initial(namespace: &str, families: Vec<FigFamily>, cursor: &str) -> Arc<Self> {
            let transport = MockTransport::default();
            transport.initial.lock().unwrap().insert(
                namespace.to_owned(),
                InitialFetchResponse {
                    fig_families: families,
                    cursor: cursor.to_owned(),
                    environment_id: "env".to_owned(),
                },
            );
            Arc::new(transport)
        }

        fn push_update(&self, namespace: &str, cursor: &str, response: UpdateFetchResponse) {
            self.updates
                .lock()
                .unwrap()
                .entry((namespace.to_owned(), cursor.to_owned()))
                .or_default()
                .push(response);
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn fetch_initial(&self, req: &InitialFetchRequest) -> Result<InitialFetchResponse> {
            self.initial
                .lock()
                .unwrap()
                .get(&req.namespace)
                .cloned()
                .ok_or_else(|| Error::Transport {
                    status: 500,
                    body: "initial fetch unavailable".to_owned(),
                    endpoint: "/data/initial".to_owned(),
                })
        }

        async fn fetch_update(&self, req: &UpdateFetchRequest) -> Result<UpdateFetchResponse> {
            let mut updates = self.updates.lock().unwrap();
            let queue = updates
                .get_mut(&(req.namespace.clone(), req.cursor.clone()))
                .filter(|queue| !queue.is_empty())
                .ok_or_else(|| Error::Transport {
                    status: 404,
                    body: "no updates".to_owned(),
                    endpoint: "/data/updates".to_owned(),
                })?;
            Ok(queue.remove(0))
        }

        async fn get_namespace_key(&self, _namespace: &str) -> Result<Vec<NamespaceKey>> {
            Ok(self.namespace_keys.lock().unwrap().clone())
        }

        async fn upload_public_key(&self, _key: &UserPublicKey) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn definition(namespace: &str, key: &str) -> FigDefinition {
        FigDefinition {
            namespace: namespace.to_owned(),
            key: key.to_owned(),
            fig_id: "f-1".to_owned(),
            schema_uri: "schema://test".to_owned(),
            schema_version: "1".to_owned(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn plain_fig(version: &str, payload: &[u8]) -> Fig {
        Fig {
            fig_id: "f-1".to_owned(),
            version: version.to_owned(),
            payload: payload.to_vec(),
            is_encrypted: false,
            wrapped_dek: None,
            key_id: None,
        }
    }

    /// Family with v1/v2 and a rule targeting v2 for user_id 123.
    fn targeted_family(namespace: &str, key: &str) -> FigFamily {
        FigFamily {
            definition: definition(namespace, key),
            figs: vec![
                plain_fig("v1", br#"{"mode":"a"}"#),
                plain_fig("v2", br#"{"mode":"b"}"#),
            ],
            rules: vec![Rule {
                description: None,
                conditions: vec![figchain_core::model::Condition {
                    variable: "user_id".to_owned(),
                    operator: Operator::Equals,
                    values: vec!["123".to_owned()],
                }],
                target_version: "v2".to_owned(),
            }],
            default_version: Some("v1".to_owned()),
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::new("https://figchain.test/api/", "env")
            .client_secret("secret")
            .namespaces(["ns"])
    }

    fn attrs(pairs: &[(&str, &str)]) -> std::collections::HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct ModeConfig {
        mode: String,
    }

    struct KeyFile {
        path: std::path::PathBuf,
    }

    impl KeyFile {
        fn new(pem: &str) -> KeyFile {
            static COUNTER: AtomicUsize = AtomicUsize::new(0);
            let path = std::env::temp_dir().join(format!(
                "figchain-sdk-test-key-{}-{}.pem",
                std::process::id(),
                COUNTER.fetch_add(1, Ordering::SeqCst),
            ));
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(pem.as_bytes()).unwrap();
            KeyFile { path }
        }
    }

    impl Drop for KeyFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    #[tokio::test]
    async fn new_fails_fast_on_invalid_configuration() {
        let err = Client::new(ClientConfig::new("", "env").client_secret("s"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn bootstrap_failure_fails_new() {
        let transport = Arc::new(MockTransport::default());
        let err = Client::with_transport(config(), transport).await.unwrap_err();
        assert!(matches!(err, Error::Transport { status: 500, .. }));
    }

    #[tokio::test]
    async fn get_fig_routes_by_rule_and_default() {
        let transport =
            MockTransport::with_initial("ns", vec![targeted_family("ns", "db")], "c0");
        let client = Client::with_transport(config(), transport).await.unwrap();

        let targeted: ModeConfig = client
            .get_fig("db", &EvaluationContext::new(attrs(&[("user_id", "123")])))
            .await
            .unwrap();
        assert_eq!(targeted.mode, "b");

        let defaulted: ModeConfig = client
            .get_fig("db", &EvaluationContext::new(attrs(&[("user_id", "456")])))
            .await
            .unwrap();
        assert_eq!(defaulted.mode, "a");

        let empty: ModeConfig = client
            .get_fig("db", &EvaluationContext::new(attrs(&[])))
            .await
            .unwrap();
        assert_eq!(empty.mode, "a");

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_fig_reports_missing_keys_and_versions() {
        let no_default = FigFamily {
            rules: vec![],
            default_version: None,
            ..targeted_family("ns", "bare")
        };
        let dangling = FigFamily {
            figs: vec![plain_fig("v9", b"{}")],
            ..targeted_family("ns", "dangling")
        };
        let transport = MockTransport::with_initial("ns", vec![no_default, dangling], "c0");
        let client = Client::with_transport(config(), transport).await.unwrap();
        let ctx = EvaluationContext::new(attrs(&[]));

        let err = client.get_fig::<ModeConfig>("missing", &ctx).await.unwrap_err();
        assert!(matches!(err, Error::FigNotFound { key } if key == "missing"));

        let err = client.get_fig::<ModeConfig>("bare", &ctx).await.unwrap_err();
        assert!(matches!(err, Error::NoMatchingFig { key } if key == "bare"));

        let err = client.get_fig::<ModeConfig>("dangling", &ctx).await.unwrap_err();
        assert!(matches!(err, Error::Evaluation(_)));

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_fig_without_namespaces_is_a_configuration_error() {
        let transport = Arc::new(MockTransport::default());
        let client = Client::with_transport(config().namespaces::<_, String>([]), transport)
            .await
            .unwrap();

        let err = client
            .get_fig::<ModeConfig>("db", &EvaluationContext::new(attrs(&[])))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn encrypted_fig_without_encryption_key_is_rejected() {
        let family = FigFamily {
            definition: definition("ns", "secret"),
            figs: vec![Fig {
                is_encrypted: true,
                wrapped_dek: Some(vec![0; 40]),
                ..plain_fig("v1", b"ciphertext")
            }],
            rules: vec![],
            default_version: Some("v1".to_owned()),
        };
        let transport = MockTransport::with_initial("ns", vec![family], "c0");
        let client = Client::with_transport(config(), transport).await.unwrap();

        let err = client
            .get_fig::<ModeConfig>("secret", &EvaluationContext::new(attrs(&[])))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EncryptionNotConfigured));

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_fig_decrypts_an_encrypted_fig_end_to_end() {
        use aes_gcm::aead::{Aead, KeyInit};
        use aes_gcm::{Aes256Gcm, Nonce};
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine;
        use rand::rngs::OsRng;
        use rsa::pkcs8::EncodePrivateKey;
        use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
        use sha2::Sha256;

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let key_file = KeyFile::new(&private_key.to_pkcs8_pem(Default::default()).unwrap());

        let nsk = [5u8; 32];
        let dek = [6u8; 32];
        let iv = [2u8; 12];

        let cipher = Aes256Gcm::new_from_slice(&dek).unwrap();
        let mut payload = iv.to_vec();
        payload.extend(cipher.encrypt(Nonce::from_slice(&iv), &br#"{"x":1}"#[..]).unwrap());

        let family = FigFamily {
            definition: definition("ns", "secret"),
            figs: vec![Fig {
                fig_id: "f-1".to_owned(),
                version: "v1".to_owned(),
                payload,
                is_encrypted: true,
                wrapped_dek: Some(figchain_core::crypto::wrap_aes_key(&dek, &nsk).unwrap()),
                key_id: None,
            }],
            rules: vec![],
            default_version: Some("v1".to_owned()),
        };

        let transport = MockTransport::with_initial("ns", vec![family], "c0");
        let wrapped_nsk = public_key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &nsk)
            .unwrap();
        *transport.namespace_keys.lock().unwrap() = vec![NamespaceKey {
            wrapped_key: BASE64.encode(wrapped_nsk),
            key_id: String::new(),
        }];

        let client = Client::with_transport(
            config().encryption_private_key_path(&key_file.path),
            transport,
        )
        .await
        .unwrap();

        #[derive(serde::Deserialize)]
        struct Target {
            x: i64,
        }
        let target: Target = client
            .get_fig("secret", &EvaluationContext::new(attrs(&[])))
            .await
            .unwrap();
        assert_eq!(target.x, 1);

        client.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn watch_delivers_updates_and_closes_on_cancel() {
        let transport = MockTransport::with_initial("ns", vec![], "c0");
        let client = Client::with_transport(config(), transport.clone()).await.unwrap();

        let cancel = CancellationToken::new();
        let mut watcher = client.watch(cancel.clone(), "db");

        transport.push_update(
            "ns",
            "c0",
            UpdateFetchResponse {
                fig_families: vec![targeted_family("ns", "db")],
                cursor: "c1".to_owned(),
            },
        );

        let family = watcher.next().await.unwrap();
        assert_eq!(family.definition.key, "db");

        cancel.cancel();
        assert!(watcher.next().await.is_none());

        client.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn listener_receives_decoded_values_and_swallows_bad_payloads() {
        let transport = MockTransport::with_initial("ns", vec![], "c0");
        let client = Client::with_transport(config(), transport.clone()).await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        client.register_listener("db", move |value: ModeConfig| {
            let _ = tx.send(value.mode);
        });

        let valid = |mode: &str| FigFamily {
            definition: definition("ns", "db"),
            figs: vec![plain_fig("v1", format!(r#"{{"mode":"{mode}"}}"#).as_bytes())],
            rules: vec![],
            default_version: Some("v1".to_owned()),
        };
        let garbage = FigFamily {
            definition: definition("ns", "db"),
            figs: vec![plain_fig("v1", b"not json")],
            rules: vec![],
            default_version: Some("v1".to_owned()),
        };

        transport.push_update(
            "ns",
            "c0",
            UpdateFetchResponse {
                fig_families: vec![valid("one")],
                cursor: "c1".to_owned(),
            },
        );
        transport.push_update(
            "ns",
            "c1",
            UpdateFetchResponse {
                fig_families: vec![garbage],
                cursor: "c2".to_owned(),
            },
        );
        transport.push_update(
            "ns",
            "c2",
            UpdateFetchResponse {
                fig_families: vec![valid("three")],
                cursor: "c3".to_owned(),
            },
        );

        // The undecodable update is logged and swallowed; the listener only observes the two
        // decodable values, in applied order.
        assert_eq!(rx.recv().await.unwrap(), "one");
        assert_eq!(rx.recv().await.unwrap(), "three");

        client.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sync_replaces_store_contents_for_get_fig() {
        let transport =
            MockTransport::with_initial("ns", vec![targeted_family("ns", "db")], "c0");
        let client = Client::with_transport(config(), transport.clone()).await.unwrap();

        let updated = FigFamily {
            definition: definition("ns", "db"),
            figs: vec![plain_fig("v1", br#"{"mode":"updated"}"#)],
            rules: vec![],
            default_version: Some("v1".to_owned()),
        };
        transport.push_update(
            "ns",
            "c0",
            UpdateFetchResponse {
                fig_families: vec![updated],
                cursor: "c1".to_owned(),
            },
        );

        // Wait until the sync engine has applied the update.
        let cancel = CancellationToken::new();
        let mut watcher = client.watch(cancel.clone(), "db");
        watcher.next().await.unwrap();

        let got: ModeConfig = client
            .get_fig("db", &EvaluationContext::new(attrs(&[])))
            .await
            .unwrap();
        assert_eq!(got.mode, "updated");

        cancel.cancel();
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let transport = MockTransport::with_initial("ns", vec![], "c0");
        let client = Client::with_transport(config(), transport).await.unwrap();
        client.close().await.unwrap();
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits_get_fig() {
        let transport = MockTransport::with_initial("ns", vec![targeted_family("ns", "db")], "c0");
        let client = Client::with_transport(config(), transport).await.unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let ctx = EvaluationContext::new(attrs(&[])).with_cancellation(token);
        let err = client.get_fig::<ModeConfig>("db", &ctx).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        client.close().await.unwrap();
    }
}
