//! SHA-256 content digests for artifact integrity.
//!
//! Digests are always 64-character lowercase hexadecimal strings; the
//! newtype rejects anything else at construction and deserialization time.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

/// Number of hex characters in a SHA-256 digest.
const HEX_CHARS: usize = 64;

/// Chunk size for streaming file contents into the hasher.
const HASH_BUFFER_LEN: usize = 8192;

/// Why a string was not accepted as a SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    /// The string is not 64 characters long.
    #[error("SHA-256 digest must be {HEX_CHARS} characters, found {found}")]
    Length {
        /// Length of the rejected string.
        found: usize,
    },
    /// The string contains something other than `0-9a-f`.
    #[error("SHA-256 digest contains '{found}' at offset {offset}; only 0-9 and a-f are allowed")]
    Character {
        /// The offending character.
        found: char,
        /// Byte offset of the offending character.
        offset: usize,
    },
}

/// A validated hex-encoded SHA-256 digest.
///
/// # Examples
///
/// ```
/// use archpack::digest::Sha256Digest;
///
/// let digest = Sha256Digest::of_bytes(b"");
/// assert_eq!(
///     digest.as_str(),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Hash an in-memory buffer.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    /// Hash the file at `path` in fixed-size chunks.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while opening or reading the file.
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut reader = fs::File::open(path)?;
        let mut state = Sha256::new();
        let mut chunk = [0u8; HASH_BUFFER_LEN];
        loop {
            let filled = reader.read(&mut chunk)?;
            if filled == 0 {
                break;
            }
            state.update(chunk.get(..filled).unwrap_or_default());
        }
        Ok(Self(format!("{:x}", state.finalize())))
    }

    /// Borrow the lowercase hex form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Sha256Digest {
    type Error = DigestError;

    fn try_from(value: &str) -> Result<Self, DigestError> {
        check_hex(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, DigestError> {
        check_hex(&value)?;
        Ok(Self(value))
    }
}

impl From<Sha256Digest> for String {
    fn from(digest: Sha256Digest) -> Self {
        digest.0
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_hex(value: &str) -> Result<(), DigestError> {
    if value.len() != HEX_CHARS {
        return Err(DigestError::Length { found: value.len() });
    }
    match value
        .char_indices()
        .find(|(_, c)| !matches!(c, '0'..='9' | 'a'..='f'))
    {
        Some((offset, found)) => Err(DigestError::Character { found, offset }),
        None => Ok(()),
    }
}
