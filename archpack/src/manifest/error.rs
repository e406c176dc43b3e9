//! Error types for package manifests.
//!
//! Each variant names the offending value and the rule it broke.

use crate::descriptor::ArchitectureDescriptor;
use crate::source::SourceError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors arising from constructing, parsing or loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read manifest {}: {source}", path.display())]
    Read {
        /// Path to the manifest file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// JSON syntax or field validation failed.
    #[error("manifest parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The schema version is outside the accepted range.
    #[error("unsupported manifest schema version {value}; current maximum is {max}")]
    UnsupportedSchemaVersion {
        /// The rejected version number.
        value: u32,
        /// The highest version this build understands.
        max: u32,
    },

    /// The library identifier is empty or contains unsafe characters.
    #[error("invalid library name \"{value}\": {reason}")]
    InvalidLibraryName {
        /// The rejected name.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The manifest version is not a semantic version.
    #[error(transparent)]
    Version(#[from] SourceError),

    /// Two entries describe the same descriptor.
    #[error("duplicate manifest entry for {descriptor}")]
    DuplicateEntry {
        /// The repeated descriptor.
        descriptor: ArchitectureDescriptor,
    },

    /// An entry path could escape the package root or is malformed.
    #[error("unsafe manifest entry path \"{path}\": {reason}")]
    UnsafePath {
        /// The rejected path.
        path: String,
        /// Description of the validation failure.
        reason: String,
    },
}

/// Result type alias using [`ManifestError`].
pub type Result<T> = std::result::Result<T, ManifestError>;
