//! Error types for pack installation.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for pack operations.
pub type Result<T> = std::result::Result<T, InstallError>;

/// Errors that can occur while resolving or installing a pack.
#[derive(Error, Debug)]
pub enum InstallError {
    /// A manifest document could not be parsed.
    #[error("malformed manifest at {url}: {source}")]
    MalformedManifest {
        url: String,
        #[source]
        source: toml::de::Error,
    },

    /// Downloaded or on-disk bytes do not match the declared hash.
    #[error("hash mismatch for {url}: expected {expected}, got {actual}")]
    HashMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    /// The hash format is not one of the supported algorithms.
    #[error("unsupported hash format {0:?}")]
    UnsupportedAlgorithm(String),

    /// A hash check was requested against an empty digest.
    #[error("expected hash is empty (format={0})")]
    EmptyExpectedHash(String),

    /// An index entry points at a metafile that was never fetched.
    #[error("metafile not found: {0}")]
    MetafileNotFound(String),

    /// A provider-specific download key could not be parsed.
    #[error("invalid provider reference {reference:?}: {reason}")]
    InvalidProviderReference { reference: String, reason: String },

    /// A metafile declares a download mode this installer cannot handle.
    #[error("unsupported download mode {mode:?} in {file}")]
    UnsupportedDownloadMode { file: String, mode: String },

    /// A manifest path would escape the install root.
    #[error("invalid path in manifest: {0}")]
    InvalidPath(String),

    /// A target side outside client/server/both.
    #[error("invalid side {0:?}, must be 'client', 'server', or 'both'")]
    InvalidSide(String),

    /// A `format:hash` argument could not be parsed.
    #[error("invalid hash {0:?}, expected <format>:<hash>")]
    InvalidHashArg(String),

    /// The provider service could not resolve a download URL.
    #[error("provider lookup failed for {reference}: {reason}")]
    ProviderLookupFailed { reference: String, reason: String },

    /// No API credential is configured for the provider service.
    #[error("no CurseForge API key configured (set {0})")]
    MissingApiKey(&'static str),

    /// The server answered with a non-success status.
    #[error("failed to fetch {url}: HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// HTTP request error during download.
    #[error("failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// I/O error during file operations.
    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The installed snapshot could not be encoded or decoded.
    #[error("invalid snapshot {}: {source}", path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A URL could not be parsed or joined.
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// A manifest document was used before `Repository::load` fetched it.
    #[error("{0} manifest accessed before it was loaded")]
    NotLoaded(&'static str),

    /// A worker task panicked or was aborted.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// The task was cancelled because a sibling failed.
    #[error("cancelled")]
    Cancelled,
}

impl InstallError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
