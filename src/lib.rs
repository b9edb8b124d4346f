//! Packsync - Install and update file packs from hash-verified remote manifests
//!
//! This library resolves a packwiz-style manifest chain (pack → index →
//! metafiles) into a flat list of files, compares it with what the previous
//! run installed, and brings a local directory in sync.
//!
//! # Features
//!
//! - **Verified Manifests**: Every manifest tier is hash-checked before use
//! - **Minimal Updates**: Only new, changed or damaged files are downloaded
//! - **Concurrent Phases**: Verification, downloads and removals run in parallel
//! - **Side Filtering**: Install client-only, server-only or all files
//! - **CurseForge Support**: Files hosted on CurseForge are resolved via its API
//!
//! # Example
//!
//! ```no_run
//! use packsync::{install_pack, InstallConfig, Side};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = InstallConfig::default();
//! let url = "https://example.com/pack/pack.toml".parse()?;
//!
//! let updates = install_pack(&config, url, None, ".", Side::Both).await?;
//! println!("{}", updates);
//! # Ok(())
//! # }
//! ```

pub mod diff;
pub mod error;
pub mod fetch;
pub mod hash;
pub mod installer;
pub mod manifest;
pub mod provider;
pub mod resolver;
pub mod snapshot;
pub mod types;

#[cfg(test)]
mod testing;

pub use diff::diff;
pub use error::{InstallError, Result};
pub use fetch::{fetch_valid_bytes, Fetcher, HttpFetcher};
pub use hash::{verify, ExpectedHash, HashFormat};
pub use installer::{install_pack, LocalInstaller};
pub use provider::{CurseForgeClient, ProviderResolver};
pub use resolver::{resolve_pack, Repository};
pub use snapshot::SnapshotStore;
pub use types::{CurseForgeRef, Download, InstallConfig, Pack, PackFile, Side, Updates};
