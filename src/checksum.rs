//! Checksum token extraction and local file hashing.
//!
//! Device output is unstructured text; the only signal of interest is a
//! 32-hex-digit MD5 signature somewhere in the noise. `extract` pulls the
//! first such token out of a buffer. `content_hash` computes the same
//! signature for a local file with streaming reads, producing the baseline
//! the device-side value is compared against.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::LazyLock;

use md5::{Digest, Md5};
use regex::Regex;

use crate::error::HashError;

/// Length of a checksum token in hex characters.
pub const TOKEN_LEN: usize = 32;

/// Chunk size for streaming file reads.
const HASH_CHUNK: usize = 4096;

static HEX32: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9a-fA-F]{32}").expect("hex token pattern"));

/// A 32-hex-digit content checksum, normalized to lowercase.
///
/// Normalizing at construction makes equality case-insensitive for free:
/// `D41D8CD9...` and `d41d8cd9...` compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumToken(String);

impl ChecksumToken {
    /// Parse a token from exactly `TOKEN_LEN` hex characters.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == TOKEN_LEN && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(s.to_ascii_lowercase()))
        } else {
            None
        }
    }

    /// The lowercase hex digits.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChecksumToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the first checksum token from a text buffer.
///
/// Pure and side-effect-free; returns `None` when the buffer holds no
/// token. It never fabricates a value - absence is a distinct outcome
/// the caller must handle.
pub fn extract(buffer: &str) -> Option<ChecksumToken> {
    HEX32
        .find(buffer)
        .and_then(|m| ChecksumToken::parse(m.as_str()))
}

/// Compute the MD5 content hash of a local file.
///
/// Reads in fixed-size chunks so large firmware images never land in
/// memory whole. Fails with [`HashError::FileNotFound`] when the path
/// does not exist.
pub fn content_hash(path: &Path) -> Result<ChecksumToken, HashError> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => HashError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => HashError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let mut hasher = Md5::new();
    let mut chunk = [0u8; HASH_CHUNK];
    loop {
        let n = file.read(&mut chunk).map_err(|e| HashError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }

    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    Ok(ChecksumToken(hex))
}
