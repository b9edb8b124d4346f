//! Download URL lookup for files hosted behind a provider API.

use crate::error::{InstallError, Result};
use crate::types::{CurseForgeRef, InstallConfig, CF_API_KEY_ENV};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Turns an indirect reference into a concrete, short-lived download URL.
#[async_trait]
pub trait ProviderResolver: Send + Sync {
    async fn download_url(&self, reference: &CurseForgeRef) -> Result<String>;
}

#[derive(Deserialize, Debug)]
struct DownloadUrlResponse {
    data: Option<String>,
}

/// Client for the CurseForge API.
#[derive(Debug, Clone)]
pub struct CurseForgeClient {
    client: reqwest::Client,
    host: String,
    api_key: Option<String>,
}

impl CurseForgeClient {
    /// Creates a client sharing `client`'s connection pool.
    ///
    /// A missing API key is only reported when a lookup is attempted, so packs
    /// without CurseForge files install without one.
    pub fn new(client: reqwest::Client, config: &InstallConfig) -> Self {
        Self {
            client,
            host: config.curseforge_api_host.trim_end_matches('/').to_string(),
            api_key: config.curseforge_api_key.clone(),
        }
    }

    fn download_url_endpoint(&self, reference: &CurseForgeRef) -> String {
        format!(
            "{}/v1/mods/{}/files/{}/download-url",
            self.host, reference.project_id, reference.file_id
        )
    }
}

#[async_trait]
impl ProviderResolver for CurseForgeClient {
    async fn download_url(&self, reference: &CurseForgeRef) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(InstallError::MissingApiKey(CF_API_KEY_ENV))?;

        let lookup_failed = |reason: String| InstallError::ProviderLookupFailed {
            reference: reference.to_string(),
            reason,
        };

        let endpoint = self.download_url_endpoint(reference);
        debug!("Resolving CurseForge file {} via {}", reference, endpoint);

        // Detached like every other fetch: an issued lookup runs to completion.
        let request = self.client.get(&endpoint).header("x-api-key", api_key);
        let response = tokio::spawn(async move {
            let response = request.send().await?.error_for_status()?;
            Ok::<_, reqwest::Error>(response.json::<DownloadUrlResponse>().await?)
        })
        .await
        .map_err(|e| InstallError::TaskFailed(format!("lookup task join error: {}", e)))?
        .map_err(|e| lookup_failed(e.to_string()))?;

        response
            .data
            .filter(|url| !url.is_empty())
            .ok_or_else(|| lookup_failed("no download URL in response".to_string()))
    }
}
