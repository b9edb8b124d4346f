//! Data structures shared by the resolver, the diff engine and the installer.

use crate::error::{InstallError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable holding the CurseForge API key.
pub const CF_API_KEY_ENV: &str = "CF_API_KEY";

/// Which side of a client/server setup a file belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Client,
    Server,
    #[default]
    Both,
    /// No side declared; installed everywhere.
    Unspecified,
}

impl Side {
    /// Whether a file tagged `file_side` belongs in an installation targeting `self`.
    pub fn should_install(&self, file_side: Side) -> bool {
        match self {
            Side::Both => true,
            Side::Client | Side::Server => {
                matches!(file_side, Side::Both | Side::Unspecified) || file_side == *self
            }
            Side::Unspecified => false,
        }
    }

    /// Parses a side as written in a metafile, where an empty value means unspecified.
    pub(crate) fn from_manifest(s: &str) -> Result<Self> {
        if s.is_empty() {
            Ok(Side::Unspecified)
        } else {
            s.parse()
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Client => "client",
            Side::Server => "server",
            Side::Both => "both",
            Side::Unspecified => "",
        }
    }
}

impl FromStr for Side {
    type Err = InstallError;

    /// Accepts only the values valid for an installation target.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "client" => Ok(Side::Client),
            "server" => Ok(Side::Server),
            "both" => Ok(Side::Both),
            other => Err(InstallError::InvalidSide(other.to_string())),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Unspecified => f.write_str("unspecified"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// A CurseForge project/file pair, written as `project:file`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CurseForgeRef {
    pub project_id: u32,
    pub file_id: u32,
}

impl FromStr for CurseForgeRef {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| InstallError::InvalidProviderReference {
            reference: s.to_string(),
            reason: reason.to_string(),
        };

        let (project, file) = s
            .split_once(':')
            .ok_or_else(|| invalid("expected <project-id>:<file-id>"))?;
        let project_id = project
            .parse()
            .map_err(|_| invalid("project id is not an integer"))?;
        let file_id = file
            .parse()
            .map_err(|_| invalid("file id is not an integer"))?;

        Ok(Self {
            project_id,
            file_id,
        })
    }
}

impl fmt::Display for CurseForgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project_id, self.file_id)
    }
}

/// Where the bytes of a pack file come from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Download {
    /// A ready-to-use URL.
    Url { url: String },
    /// A CurseForge file whose URL must be looked up first.
    #[serde(rename = "curseforge")]
    CurseForge(CurseForgeRef),
}

/// A single file managed by a pack, after manifest resolution.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PackFile {
    /// Slash-separated path relative to the install root.
    pub path: String,
    pub hash: String,
    #[serde(rename = "hashFormat")]
    pub hash_format: String,
    #[serde(default)]
    pub side: Side,
    pub download: Download,
}

/// A resolved pack: its metadata and the flat list of files it manages.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Pack {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    pub files: Vec<PackFile>,
}

/// The outcome of a reconciliation pass.
///
/// No ordering is promised within a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Updates {
    pub added: Vec<PackFile>,
    pub removed: Vec<PackFile>,
    pub unchanged: Vec<PackFile>,
}

impl Updates {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.unchanged.is_empty()
    }
}

impl fmt::Display for Updates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = [
            ("Added", &self.added),
            ("Removed", &self.removed),
            ("Unchanged", &self.unchanged),
        ];
        for (title, files) in sections {
            writeln!(f, "{}:", title)?;
            let mut paths: Vec<_> = files.iter().map(|file| file.path.as_str()).collect();
            paths.sort_unstable();
            for path in paths {
                writeln!(f, "  {}", path)?;
            }
        }
        Ok(())
    }
}

/// Configuration for resolving and installing packs.
///
/// # Example
///
/// ```
/// use packsync::InstallConfig;
///
/// let config = InstallConfig {
///     max_concurrent_tasks: 8,
///     ..InstallConfig::default()
/// };
/// assert_eq!(config.state_dir, ".packsync");
/// ```
#[derive(Debug, Clone)]
pub struct InstallConfig {
    /// Maximum number of concurrent tasks per phase (default: available parallelism).
    pub max_concurrent_tasks: usize,
    /// User agent sent with every HTTP request.
    pub user_agent: String,
    /// Base URL of the CurseForge API.
    pub curseforge_api_host: String,
    /// CurseForge API key, read from `CF_API_KEY` or baked in at build time.
    pub curseforge_api_key: Option<String>,
    /// Hidden directory under the install root holding installer state.
    pub state_dir: String,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            user_agent: format!(
                "{}/{} ({})",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                env!("CARGO_PKG_REPOSITORY")
            ),
            curseforge_api_host: "https://api.curseforge.com".to_string(),
            curseforge_api_key: std::env::var(CF_API_KEY_ENV)
                .ok()
                .or_else(|| option_env!("PACKSYNC_CF_API_KEY").map(str::to_string))
                .filter(|key| !key.is_empty()),
            state_dir: ".packsync".to_string(),
        }
    }
}
