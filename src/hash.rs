//! Hash verification for manifests and pack files.
//!
//! Every byte that reaches the install root is checked against a digest from
//! the manifest chain. The supported formats are listed in
//! [`HashFormat::PREFERRED`], most preferred first.

use crate::error::{InstallError, Result};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Buffer size used when hashing files on disk (1MB).
const BUFFER_SIZE: usize = 1024 * 1024;

/// Seed used by the CurseForge flavour of MurmurHash2.
const MURMUR2_SEED: u32 = 1;

/// A supported digest algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashFormat {
    Murmur2,
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashFormat {
    /// Supported formats in descending order of preference.
    pub const PREFERRED: [HashFormat; 5] = [
        HashFormat::Murmur2,
        HashFormat::Md5,
        HashFormat::Sha1,
        HashFormat::Sha256,
        HashFormat::Sha512,
    ];

    /// The identifier used in manifests and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Murmur2 => "murmur2",
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Computes the lowercase hex digest of `data`.
    pub fn digest(&self, data: &[u8]) -> String {
        let mut hasher = Hasher::new(*self);
        hasher.update(data);
        hasher.finalize_hex()
    }
}

impl fmt::Display for HashFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashFormat {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self> {
        Self::PREFERRED
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| InstallError::UnsupportedAlgorithm(s.to_string()))
    }
}

/// Incremental hasher over any supported format.
enum Hasher {
    // murmur2 hashes the length up front, so the normalized input is buffered
    Murmur2(Vec<u8>),
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    fn new(format: HashFormat) -> Self {
        match format {
            HashFormat::Murmur2 => Self::Murmur2(Vec::new()),
            HashFormat::Md5 => Self::Md5(Md5::new()),
            HashFormat::Sha1 => Self::Sha1(Sha1::new()),
            HashFormat::Sha256 => Self::Sha256(Sha256::new()),
            HashFormat::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Murmur2(buf) => buf.extend(data.iter().filter(|b| !is_murmur_whitespace(**b))),
            Self::Md5(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Murmur2(buf) => hex::encode(murmur2(&buf, MURMUR2_SEED).to_be_bytes()),
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Sha1(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

fn is_murmur_whitespace(b: u8) -> bool {
    matches!(b, 9 | 10 | 13 | 32)
}

/// 32-bit MurmurHash2.
fn murmur2(data: &[u8], seed: u32) -> u32 {
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let mut h = seed ^ (data.len() as u32);
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= u32::from(tail[2]) << 16;
    }
    if tail.len() >= 2 {
        h ^= u32::from(tail[1]) << 8;
    }
    if !tail.is_empty() {
        h ^= u32::from(tail[0]);
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}

/// Checks `data` against an expected hex digest.
///
/// Fails with [`InstallError::EmptyExpectedHash`] when `expected` is empty and
/// with [`InstallError::UnsupportedAlgorithm`] when `format` is unknown. The
/// comparison ignores hex case.
pub fn verify(data: &[u8], format: &str, expected: &str) -> Result<bool> {
    if expected.is_empty() {
        return Err(InstallError::EmptyExpectedHash(format.to_string()));
    }
    let format = HashFormat::from_str(format)?;
    Ok(format.digest(data).eq_ignore_ascii_case(expected))
}

/// Computes the digest of a local file.
///
/// The file is read in chunks on a blocking thread so large files never sit
/// in memory at once.
pub(crate) async fn hash_file(path: &Path, format: HashFormat) -> Result<String> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        use std::io::Read;

        let file = std::fs::File::open(&path).map_err(|e| InstallError::io("open", &path, e))?;
        let mut reader = std::io::BufReader::with_capacity(BUFFER_SIZE, file);
        let mut hasher = Hasher::new(format);
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            let n = reader
                .read(&mut buffer)
                .map_err(|e| InstallError::io("read", &path, e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(hasher.finalize_hex())
    })
    .await
    .map_err(|e| InstallError::TaskFailed(format!("hash task join error: {}", e)))?
}

/// A `format:hash` pair, as accepted for the top-level pack document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedHash {
    pub format: HashFormat,
    pub hash: String,
}

impl FromStr for ExpectedHash {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self> {
        let (format, hash) = s
            .split_once(':')
            .filter(|(format, hash)| !format.is_empty() && !hash.is_empty())
            .ok_or_else(|| InstallError::InvalidHashArg(s.to_string()))?;

        Ok(Self {
            format: format.parse()?,
            hash: hash.to_string(),
        })
    }
}

impl fmt::Display for ExpectedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.format, self.hash)
    }
}
