//! Manifest resolution: pack → index → metafiles → flat file list.
//!
//! Each tier is verified before its contents are trusted. The pack document is
//! checked against a caller-supplied hash when one is given, the index against
//! the hash declared in the pack, and every metafile against the hash declared
//! in the index.

use crate::error::{InstallError, Result};
use crate::fetch::{fetch_valid_bytes, Fetcher};
use crate::hash::ExpectedHash;
use crate::manifest::{self, IndexEntry, IndexToml, MetafileToml, PackToml};
use crate::types::{CurseForgeRef, Download, InstallConfig, Pack, PackFile, Side};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};
use url::Url;

const MODE_URL: &str = "url";
const MODE_CURSEFORGE: &str = "metadata:curseforge";

/// A remote pack and the manifest documents loaded for it.
pub struct Repository {
    url: Url,
    pack_hash: Option<ExpectedHash>,
    fetcher: Arc<dyn Fetcher>,
    max_concurrent_fetches: usize,
    pack: Option<PackToml>,
    index: Option<IndexToml>,
    /// Metafiles keyed by the index entry they were fetched for.
    metafiles: HashMap<String, MetafileToml>,
}

impl Repository {
    pub fn new(
        url: Url,
        pack_hash: Option<ExpectedHash>,
        fetcher: Arc<dyn Fetcher>,
        config: &InstallConfig,
    ) -> Self {
        Self {
            url,
            pack_hash,
            fetcher,
            max_concurrent_fetches: config.max_concurrent_tasks.max(1),
            pack: None,
            index: None,
            metafiles: HashMap::new(),
        }
    }

    /// Location of the pack document.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Directory containing the pack document.
    pub fn base_url(&self) -> Result<Url> {
        Ok(self.url.join(".")?)
    }

    /// Location of the index document.
    pub fn index_url(&self) -> Result<Url> {
        let pack = self.pack.as_ref().ok_or(InstallError::NotLoaded("pack"))?;
        sibling_url(&self.url, &normalize_path(&pack.index.file)?)
    }

    /// Loads the whole manifest chain.
    pub async fn load(&mut self) -> Result<()> {
        self.load_pack().await?;
        self.load_index().await?;
        self.load_metafiles().await
    }

    async fn load_pack(&mut self) -> Result<()> {
        let url = self.url.as_str();
        info!("Retrieving pack from {}", url);

        let data = match &self.pack_hash {
            Some(expected) => {
                fetch_valid_bytes(
                    self.fetcher.as_ref(),
                    url,
                    expected.format.as_str(),
                    &expected.hash,
                )
                .await?
            }
            None => {
                debug!("No pack hash supplied, trusting {} as fetched", url);
                self.fetcher.fetch_bytes(url).await?
            }
        };

        self.pack = Some(manifest::parse_pack(url, &data)?);
        Ok(())
    }

    async fn load_index(&mut self) -> Result<()> {
        let index_url = self.index_url()?;
        let pack = self.pack.as_ref().ok_or(InstallError::NotLoaded("pack"))?;
        info!("Retrieving index from {}", index_url);

        // The index is the root of trust for every file, so its hash is mandatory.
        let data = fetch_valid_bytes(
            self.fetcher.as_ref(),
            index_url.as_str(),
            &pack.index.hash_format,
            &pack.index.hash,
        )
        .await?;

        self.index = Some(manifest::parse_index(index_url.as_str(), &data)?);
        Ok(())
    }

    async fn load_metafiles(&mut self) -> Result<()> {
        let index_url = self.index_url()?;
        let index = self.index.as_ref().ok_or(InstallError::NotLoaded("index"))?;

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_fetches));
        let loaded = Arc::new(Mutex::new(HashMap::new()));
        let mut tasks = JoinSet::new();

        for entry in index.files.iter().filter(|entry| entry.metafile) {
            let url = sibling_url(&index_url, &normalize_path(&entry.file)?)?;
            let name = entry.file.clone();
            let hash = entry.hash.clone();
            let hash_format = index.hash_format_for(entry).to_string();
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&semaphore);
            let loaded = Arc::clone(&loaded);

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| InstallError::Cancelled)?;

                let data =
                    fetch_valid_bytes(fetcher.as_ref(), url.as_str(), &hash_format, &hash).await?;
                let metafile = manifest::parse_metafile(url.as_str(), &data)?;

                loaded.lock().insert(name, metafile);
                Ok::<(), InstallError>(())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| InstallError::TaskFailed(format!("metafile task: {}", e)))
                .and_then(|result| result);
            if let Err(e) = outcome {
                tasks.shutdown().await;
                return Err(e);
            }
        }

        self.metafiles = std::mem::take(&mut *loaded.lock());
        info!("Loaded {} metafiles", self.metafiles.len());
        Ok(())
    }

    /// Flattens the loaded manifests into a [`Pack`].
    pub fn to_pack(&self) -> Result<Pack> {
        let pack = self.pack.as_ref().ok_or(InstallError::NotLoaded("pack"))?;
        let index = self.index.as_ref().ok_or(InstallError::NotLoaded("index"))?;
        let index_url = self.index_url()?;

        let files = index
            .files
            .iter()
            .map(|entry| {
                if entry.metafile {
                    let metafile = self
                        .metafiles
                        .get(&entry.file)
                        .ok_or_else(|| InstallError::MetafileNotFound(entry.file.clone()))?;
                    metafile_to_file(entry, metafile)
                } else {
                    direct_to_file(&index_url, index, entry)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Pack {
            name: pack.name.clone(),
            author: pack.author.clone(),
            version: pack.version.clone(),
            files,
        })
    }
}

/// Loads the manifest chain at `url` and flattens it.
pub async fn resolve_pack(
    url: Url,
    pack_hash: Option<ExpectedHash>,
    fetcher: Arc<dyn Fetcher>,
    config: &InstallConfig,
) -> Result<Pack> {
    let mut repository = Repository::new(url, pack_hash, fetcher, config);
    repository.load().await?;
    repository.to_pack()
}

/// Resolves a relative file path against the directory of `document`.
///
/// Every segment is percent-encoded, so `#` and `?` stay part of the path.
fn sibling_url(document: &Url, path: &str) -> Result<Url> {
    let mut url = document.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop()
        .extend(path.split('/'));
    Ok(url)
}

fn direct_to_file(index_url: &Url, index: &IndexToml, entry: &IndexEntry) -> Result<PackFile> {
    let path = normalize_path(&entry.file)?;
    let url = sibling_url(index_url, &path)?;

    Ok(PackFile {
        path,
        hash: entry.hash.clone(),
        hash_format: index.hash_format_for(entry).to_string(),
        side: Side::Both,
        download: Download::Url {
            url: url.to_string(),
        },
    })
}

fn metafile_to_file(entry: &IndexEntry, metafile: &MetafileToml) -> Result<PackFile> {
    let path = match entry.file.rsplit_once(['/', '\\']) {
        Some((dir, _)) => normalize_path(&format!("{}/{}", dir, metafile.filename))?,
        None => normalize_path(&metafile.filename)?,
    };

    let download = match metafile.download.mode.as_str() {
        "" | MODE_URL => Download::Url {
            url: metafile.download.url.clone(),
        },
        MODE_CURSEFORGE => Download::CurseForge(curseforge_ref(entry, metafile)?),
        other => {
            return Err(InstallError::UnsupportedDownloadMode {
                file: entry.file.clone(),
                mode: other.to_string(),
            })
        }
    };

    Ok(PackFile {
        path,
        hash: metafile.download.hash.clone(),
        hash_format: metafile.download.hash_format.clone(),
        side: Side::from_manifest(&metafile.side)?,
        download,
    })
}

fn curseforge_ref(entry: &IndexEntry, metafile: &MetafileToml) -> Result<CurseForgeRef> {
    let cf = metafile
        .update
        .as_ref()
        .and_then(|update| update.curseforge.as_ref())
        .ok_or_else(|| InstallError::InvalidProviderReference {
            reference: entry.file.clone(),
            reason: "missing [update.curseforge] table".to_string(),
        })?;

    // Round-trip through the key form so malformed ids are caught in one place.
    format!("{}:{}", cf.project_id, cf.file_id).parse()
}

/// Converts a manifest path into a slash-separated path relative to the
/// install root, rejecting anything that would escape it.
pub(crate) fn normalize_path(raw: &str) -> Result<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in raw.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => return Err(InstallError::InvalidPath(raw.to_string())),
            part if part.contains(':') => return Err(InstallError::InvalidPath(raw.to_string())),
            part => parts.push(part),
        }
    }
    if parts.is_empty() || raw.starts_with(['/', '\\']) {
        return Err(InstallError::InvalidPath(raw.to_string()));
    }
    Ok(parts.join("/"))
}
