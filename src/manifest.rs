//! Manifest documents: the pack, its index, and per-file metafiles.
//!
//! These are decoded once during resolution and then discarded in favour of
//! the flat [`PackFile`](crate::PackFile) list.

use crate::error::{InstallError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level `pack.toml`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct PackToml {
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pack_format: String,
    pub index: PackIndexRef,
    #[serde(default)]
    pub versions: BTreeMap<String, String>,
}

/// The `[index]` table of a pack: where the index lives and its hash.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct PackIndexRef {
    pub file: String,
    #[serde(default)]
    pub hash_format: String,
    #[serde(default)]
    pub hash: String,
}

/// `index.toml`, enumerating every managed file.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct IndexToml {
    /// Default hash format for entries that do not declare one.
    pub hash_format: String,
    #[serde(default)]
    pub files: Vec<IndexEntry>,
}

impl IndexToml {
    /// The hash format that applies to `entry`.
    pub fn hash_format_for<'a>(&'a self, entry: &'a IndexEntry) -> &'a str {
        if entry.hash_format.is_empty() {
            &self.hash_format
        } else {
            &entry.hash_format
        }
    }
}

/// One `[[files]]` entry of the index.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct IndexEntry {
    pub file: String,
    pub hash: String,
    #[serde(default)]
    pub hash_format: String,
    #[serde(default)]
    pub alias: String,
    /// The entry points at a metafile rather than the file itself.
    #[serde(default)]
    pub metafile: bool,
    #[serde(default)]
    pub preserve: bool,
}

/// A per-file metadata document, usually `mods/<name>.pw.toml`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct MetafileToml {
    pub filename: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub side: String,
    pub download: MetafileDownload,
    #[serde(default)]
    pub update: Option<MetafileUpdate>,
    #[serde(default)]
    pub option: Option<MetafileOption>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct MetafileDownload {
    pub hash_format: String,
    pub hash: String,
    #[serde(default)]
    pub url: String,
    /// Empty or `url` for a plain download, `metadata:curseforge` for a provider lookup.
    #[serde(default)]
    pub mode: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetafileUpdate {
    #[serde(default)]
    pub modrinth: Option<UpdateModrinth>,
    #[serde(default)]
    pub curseforge: Option<UpdateCurseForge>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct UpdateModrinth {
    #[serde(default)]
    pub mod_id: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct UpdateCurseForge {
    pub project_id: u32,
    pub file_id: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetafileOption {
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub description: String,
}

fn parse<T: serde::de::DeserializeOwned>(url: &str, data: &[u8]) -> Result<T> {
    let text = String::from_utf8_lossy(data);
    toml::from_str(&text).map_err(|source| InstallError::MalformedManifest {
        url: url.to_string(),
        source,
    })
}

/// Parses a pack document fetched from `url`.
pub fn parse_pack(url: &str, data: &[u8]) -> Result<PackToml> {
    parse(url, data)
}

/// Parses an index document fetched from `url`.
pub fn parse_index(url: &str, data: &[u8]) -> Result<IndexToml> {
    parse(url, data)
}

/// Parses a metafile fetched from `url`.
pub fn parse_metafile(url: &str, data: &[u8]) -> Result<MetafileToml> {
    parse(url, data)
}
