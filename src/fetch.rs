//! Remote content retrieval.

use crate::error::{InstallError, Result};
use crate::hash::HashFormat;
use crate::types::InstallConfig;
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, warn};

/// Source of remote bytes.
///
/// Abstracts the network so resolution and installation can run against
/// in-memory content.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieves the full body at `url`.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches `url` and checks the body against `expected` before returning it.
///
/// The hash parameters are validated before any request is made. A body that
/// does not match fails with [`InstallError::HashMismatch`].
pub async fn fetch_valid_bytes(
    fetcher: &dyn Fetcher,
    url: &str,
    format: &str,
    expected: &str,
) -> Result<Vec<u8>> {
    if expected.is_empty() {
        return Err(InstallError::EmptyExpectedHash(format.to_string()));
    }
    let format: HashFormat = format.parse()?;

    let data = fetcher.fetch_bytes(url).await?;
    let actual = format.digest(&data);
    if !actual.eq_ignore_ascii_case(expected) {
        warn!("Hash mismatch for {}: expected {}, got {}", url, expected, actual);
        return Err(InstallError::HashMismatch {
            url: url.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }

    debug!("Verified {} ({} {} bytes)", url, format, data.len());
    Ok(data)
}

/// [`Fetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &InstallConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .map_err(InstallError::Client)?;
        Ok(Self { client })
    }

    /// The underlying client, for collaborators that share its connection pool.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    /// The request runs on its own task, so dropping the caller does not
    /// abort a fetch that has already been issued.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let client = self.client.clone();
        let url = url.to_string();

        tokio::spawn(async move { download(&client, &url).await })
            .await
            .map_err(|e| InstallError::TaskFailed(format!("fetch task join error: {}", e)))?
    }
}

async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let http_err = |source| InstallError::Http {
        url: url.to_string(),
        source,
    };

    debug!("GET {}", url);
    let response = client.get(url).send().await.map_err(http_err)?;

    let status = response.status();
    if !status.is_success() {
        return Err(InstallError::HttpStatus {
            url: url.to_string(),
            status,
        });
    }

    let mut body = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
    let mut byte_stream = response.bytes_stream();
    while let Some(piece) = byte_stream.next().await {
        body.extend_from_slice(&piece.map_err(http_err)?);
    }

    Ok(body)
}
