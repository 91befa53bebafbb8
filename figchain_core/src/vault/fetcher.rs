use async_trait::async_trait;
use url::Url;

use crate::{Error, Result};

/// Fetches the encrypted backup blob for a public-key fingerprint.
///
/// The production object store is an external collaborator behind this trait; authenticated
/// stores (AWS SDK, signed URLs) implement it on top of their own clients.
#[async_trait]
pub trait BackupFetcher: Send + Sync {
    /// Fetch the backup object stored under the given fingerprint.
    async fn fetch_backup(&self, key_fingerprint: &str) -> Result<Vec<u8>>;
}

/// Plain-HTTP fetcher for S3-compatible object stores (MinIO, path-style S3, public buckets).
///
/// Objects live at `{prefix?}/{fingerprint}/backup.json` inside the bucket; leading slashes are
/// stripped from the resulting key.
pub struct HttpBackupFetcher {
    client: reqwest::Client,
    base: Url,
    prefix: String,
}

impl HttpBackupFetcher {
    /// Create a fetcher.
    ///
    /// With `endpoint` set, path-style addressing puts the bucket on the path
    /// (`{endpoint}/{bucket}/{key}`); otherwise the bucket is assumed to be part of the endpoint
    /// host. Without an endpoint, the AWS form `https://{bucket}.s3.{region}.amazonaws.com` is
    /// used (`region` defaults to `us-east-1`).
    pub fn new(
        bucket: &str,
        prefix: &str,
        region: &str,
        endpoint: Option<&str>,
        path_style: bool,
    ) -> Result<Self> {
        if bucket.is_empty() && endpoint.is_none() {
            return Err(Error::InvalidConfiguration(
                "vault_bucket is required when no vault_endpoint is set".to_owned(),
            ));
        }

        let base = match endpoint {
            Some(endpoint) => {
                let mut url = Url::parse(endpoint).map_err(Error::InvalidBaseUrl)?;
                if path_style {
                    url.path_segments_mut()
                        .map_err(|_| Error::InvalidBaseUrl(url::ParseError::RelativeUrlWithoutBase))?
                        .pop_if_empty()
                        .push(bucket);
                }
                url
            }
            None => {
                let region = if region.is_empty() { "us-east-1" } else { region };
                Url::parse(&format!("https://{bucket}.s3.{region}.amazonaws.com"))
                    .map_err(Error::InvalidBaseUrl)?
            }
        };

        Ok(HttpBackupFetcher {
            client: reqwest::Client::new(),
            base,
            prefix: prefix.trim_matches('/').to_owned(),
        })
    }

    fn object_url(&self, key_fingerprint: &str) -> Url {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .expect("base url validated at construction");
            segments.pop_if_empty();
            if !self.prefix.is_empty() {
                segments.extend(self.prefix.split('/'));
            }
            segments.push(key_fingerprint);
            segments.push("backup.json");
        }
        url
    }
}

#[async_trait]
impl BackupFetcher for HttpBackupFetcher {
    async fn fetch_backup(&self, key_fingerprint: &str) -> Result<Vec<u8>> {
        let url = self.object_url(key_fingerprint);
        log::debug!(target: "figchain", "fetching vault backup from {url}");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(Error::Transport {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
                endpoint: url.to_string(),
            });
        }
        Ok(bytes.to_vec())
    }
}
