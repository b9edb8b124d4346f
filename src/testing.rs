//! In-memory collaborators for unit tests.

use crate::error::{InstallError, Result};
use crate::fetch::Fetcher;
use crate::provider::ProviderResolver;
use crate::types::CurseForgeRef;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Serves fixed bodies by URL and records every request.
#[derive(Default)]
pub(crate) struct MemoryFetcher {
    bodies: HashMap<String, Vec<u8>>,
    /// URLs whose fetch never completes.
    stalled: HashSet<String>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }

    pub(crate) fn stalled(mut self, url: &str) -> Self {
        self.stalled.insert(url.to_string());
        self
    }

    pub(crate) fn body(&self, url: &str) -> Option<Vec<u8>> {
        self.bodies.get(url).cloned()
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.lock().push(url.to_string());
        if self.stalled.contains(url) {
            return std::future::pending().await;
        }
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| InstallError::HttpStatus {
                url: url.to_string(),
                status: reqwest::StatusCode::NOT_FOUND,
            })
    }
}

/// Maps CurseForge references to fixed URLs.
#[derive(Default)]
pub(crate) struct MemoryResolver {
    urls: HashMap<CurseForgeRef, String>,
}

impl MemoryResolver {
    pub(crate) fn with(mut self, reference: CurseForgeRef, url: &str) -> Self {
        self.urls.insert(reference, url.to_string());
        self
    }
}

#[async_trait]
impl ProviderResolver for MemoryResolver {
    async fn download_url(&self, reference: &CurseForgeRef) -> Result<String> {
        self.urls
            .get(reference)
            .cloned()
            .ok_or_else(|| InstallError::ProviderLookupFailed {
                reference: reference.to_string(),
                reason: "unknown file".to_string(),
            })
    }
}
