//! Native source tree and its recorded version.
//!
//! The version string is stored next to the source (a `VERSION` file by
//! default) and is updated whenever the source is replaced. It is read once,
//! before any build starts, and then travels as an immutable value through
//! the builder, every artifact, and the manifest assembler.

use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default name of the file recording the upstream library version.
pub const DEFAULT_VERSION_FILE: &str = "VERSION";

/// Errors arising from reading the native source tree.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source directory does not exist or is not a directory.
    #[error("native source directory not found: {}", path.display())]
    MissingSourceDir {
        /// The path that was expected to be a directory.
        path: PathBuf,
    },

    /// The version file could not be read.
    #[error("failed to read version file {}: {source}", path.display())]
    VersionFile {
        /// Path to the version file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The recorded version is not a semantic version.
    #[error("invalid source version \"{value}\": {reason}")]
    InvalidVersion {
        /// The rejected version string.
        value: String,
        /// Description of the parse failure.
        reason: String,
    },
}

/// A validated semantic version string, e.g. `3.45.0`.
///
/// Equality compares the parsed version, and the original text is what gets
/// displayed and serialized.
///
/// # Examples
///
/// ```
/// use archpack::source::SourceVersion;
///
/// let version = SourceVersion::parse("3.45.0").expect("valid version");
/// assert_eq!(version.as_str(), "3.45.0");
/// assert!(SourceVersion::parse("three").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceVersion {
    text: String,
    parsed: semver::Version,
}

impl SourceVersion {
    /// Parse and validate a version string, ignoring surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidVersion`] if the text is not a valid
    /// semantic version.
    pub fn parse(value: &str) -> Result<Self, SourceError> {
        let text = value.trim();
        let parsed = semver::Version::parse(text).map_err(|e| SourceError::InvalidVersion {
            value: text.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            text: text.to_owned(),
            parsed,
        })
    }

    /// Return the version as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Return the parsed semantic version.
    #[must_use]
    pub fn semver(&self) -> &semver::Version {
        &self.parsed
    }
}

impl PartialEq for SourceVersion {
    fn eq(&self, other: &Self) -> bool {
        self.parsed == other.parsed
    }
}

impl Eq for SourceVersion {}

impl TryFrom<String> for SourceVersion {
    type Error = SourceError;

    fn try_from(value: String) -> Result<Self, SourceError> {
        Self::parse(&value)
    }
}

impl From<SourceVersion> for String {
    fn from(version: SourceVersion) -> Self {
        version.text
    }
}

impl fmt::Display for SourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// The native source directory together with its recorded version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceProvenance {
    source_dir: PathBuf,
    version: SourceVersion,
}

impl SourceProvenance {
    /// Construct provenance from an already-known version.
    #[must_use]
    pub fn new(source_dir: impl Into<PathBuf>, version: SourceVersion) -> Self {
        Self {
            source_dir: source_dir.into(),
            version,
        }
    }

    /// Read the version recorded in `source_dir/version_file`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing, the version file cannot
    /// be read, or its content is not a semantic version.
    pub fn read(source_dir: &Path, version_file: &str) -> Result<Self, SourceError> {
        if !source_dir.is_dir() {
            return Err(SourceError::MissingSourceDir {
                path: source_dir.to_path_buf(),
            });
        }
        let path = source_dir.join(version_file);
        let contents = fs::read_to_string(&path).map_err(|source| SourceError::VersionFile {
            path: path.clone(),
            source,
        })?;
        let version = SourceVersion::parse(&contents)?;
        debug!(
            target: "archpack::source",
            "read source version {version} from {}",
            path.display()
        );
        Ok(Self::new(source_dir, version))
    }

    /// Return the native source directory.
    #[must_use]
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Return the recorded version.
    #[must_use]
    pub fn version(&self) -> &SourceVersion {
        &self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn reads_trimmed_version_file() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join(DEFAULT_VERSION_FILE), "3.45.0\n").expect("write version");

        let provenance =
            SourceProvenance::read(dir.path(), DEFAULT_VERSION_FILE).expect("provenance");
        assert_eq!(provenance.version().as_str(), "3.45.0");
        assert_eq!(provenance.source_dir(), dir.path());
    }

    #[test]
    fn missing_version_file_is_reported_with_path() {
        let dir = TempDir::new().expect("temp dir");
        let err = SourceProvenance::read(dir.path(), DEFAULT_VERSION_FILE)
            .expect_err("version file absent");
        assert!(matches!(err, SourceError::VersionFile { .. }));
        assert!(err.to_string().contains(DEFAULT_VERSION_FILE));
    }

    #[test]
    fn missing_source_dir_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let err = SourceProvenance::read(&dir.path().join("nope"), DEFAULT_VERSION_FILE)
            .expect_err("directory absent");
        assert!(matches!(err, SourceError::MissingSourceDir { .. }));
    }

    #[rstest]
    #[case::empty("")]
    #[case::two_components("3.45")]
    #[case::words("latest")]
    fn rejects_non_semver_text(#[case] value: &str) {
        assert!(matches!(
            SourceVersion::parse(value),
            Err(SourceError::InvalidVersion { .. })
        ));
    }

    #[test]
    fn equality_is_semantic_and_display_keeps_text() {
        let a = SourceVersion::parse("3.45.0").expect("valid");
        let b = SourceVersion::parse(" 3.45.0 ").expect("valid");
        let c = SourceVersion::parse("3.45.1").expect("valid");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(b.to_string(), "3.45.0");
    }
}
