//! Wire calls to the FigChain server.
//!
//! [`Transport`] is the seam between the client and the server API; [`HttpTransport`] is the
//! production implementation over HTTP. Request/response bodies go through a pluggable
//! [`WireCodec`]; the namespace-key endpoints are always JSON.
//!
//! Cancellation is by future drop: callers race transport futures against their cancellation
//! token, and dropping an in-flight future aborts the underlying request without modifying any
//! client state.
use async_trait::async_trait;
use url::Url;

use crate::model::{
    InitialFetchRequest, InitialFetchResponse, NamespaceKey, UpdateFetchRequest,
    UpdateFetchResponse, UserPublicKey,
};
use crate::{Error, Result};

mod auth;
mod codec;

pub use auth::{PrivateKeyTokenProvider, SharedSecretTokenProvider, TokenProvider};
pub use codec::{JsonCodec, WireCodec};

/// Interface for fetching data from the FigChain API.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the initial state of a namespace.
    async fn fetch_initial(&self, req: &InitialFetchRequest) -> Result<InitialFetchResponse>;

    /// Fetch updates for a namespace past the given cursor. An empty cursor asks for full state.
    async fn fetch_update(&self, req: &UpdateFetchRequest) -> Result<UpdateFetchResponse>;

    /// Fetch the wrapping keys registered for a namespace.
    async fn get_namespace_key(&self, namespace: &str) -> Result<Vec<NamespaceKey>>;

    /// Register a client public key with the server.
    async fn upload_public_key(&self, key: &UserPublicKey) -> Result<()>;

    /// Release any owned transport state.
    async fn close(&self) -> Result<()>;
}

/// HTTP implementation of [`Transport`] over a shared connection pool.
///
/// Every call fetches a fresh bearer token from the [`TokenProvider`] (tokens may be
/// short-lived).
pub struct HttpTransport<C = JsonCodec> {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
    base_url: Url,
    token_provider: std::sync::Arc<dyn TokenProvider>,
    codec: C,
}

impl<C: WireCodec> HttpTransport<C> {
    /// Create a transport against `base_url` (with or without a trailing slash).
    pub fn new(
        base_url: &str,
        token_provider: std::sync::Arc<dyn TokenProvider>,
        codec: C,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(Error::InvalidBaseUrl)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidBaseUrl(url::ParseError::RelativeUrlWithoutBase));
        }
        Ok(HttpTransport {
            client: reqwest::Client::new(),
            base_url,
            token_provider,
            codec,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .expect("base url validated at construction")
            .pop_if_empty()
            .extend(segments);
        url
    }

    async fn post_codec<Req, Resp>(&self, segments: &[&str], req: &Req) -> Result<Resp>
    where
        Req: serde::Serialize + Sync,
        Resp: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(segments);
        let body = self.codec.encode(req)?;
        let token = self.token_provider.token()?;

        let response = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, self.codec.content_type())
            .bearer_auth(token)
            .body(body)
            .send()
            .await?;

        let bytes = check_status(url, response).await?;
        self.codec.decode(&bytes)
    }
}

/// Read the body, mapping non-2xx responses to [`Error::Transport`].
async fn check_status(url: Url, response: reqwest::Response) -> Result<Vec<u8>> {
    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        log::warn!(target: "figchain",
            "server returned {status} from {url}");
        return Err(Error::Transport {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
            endpoint: url.to_string(),
        });
    }
    Ok(bytes.to_vec())
}

#[async_trait]
impl<C: WireCodec> Transport for HttpTransport<C> {
    async fn fetch_initial(&self, req: &InitialFetchRequest) -> Result<InitialFetchResponse> {
        log::debug!(target: "figchain", "fetching initial state for namespace {}", req.namespace);
        self.post_codec(&["data", "initial"], req).await
    }

    async fn fetch_update(&self, req: &UpdateFetchRequest) -> Result<UpdateFetchResponse> {
        log::debug!(target: "figchain", "fetching updates for namespace {}", req.namespace);
        self.post_codec(&["data", "updates"], req).await
    }

    async fn get_namespace_key(&self, namespace: &str) -> Result<Vec<NamespaceKey>> {
        let url = self.endpoint(&["keys", "namespace", namespace]);
        let token = self.token_provider.token()?;

        let response = self.client.get(url.clone()).bearer_auth(token).send().await?;
        let bytes = check_status(url, response).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn upload_public_key(&self, key: &UserPublicKey) -> Result<()> {
        let url = self.endpoint(&["keys", "public"]);
        let token = self.token_provider.token()?;

        let response = self
            .client
            .put(url.clone())
            .bearer_auth(token)
            .json(key)
            .send()
            .await?;
        check_status(url, response).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // The connection pool is released when the client drops.
        Ok(())
    }
}
