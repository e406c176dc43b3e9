//! Consumer-side placement of the resolved binary.
//!
//! [`resolve_and_place`] is the single operation a consumer's build calls:
//! it resolves the consumer's descriptor against the package manifest and
//! copies the selected binary into the output directory under its declared
//! file name. Copies go through a temporary file in the output directory and
//! are verified against the manifest digest before the final rename, so an
//! interrupted or corrupt placement never leaves a partial binary behind.

use crate::descriptor::ArchitectureDescriptor;
use crate::digest::Sha256Digest;
use crate::manifest::{self, MANIFEST_FILE, ManifestError, PackageManifest};
use crate::resolver::{ResolveError, resolve};
use crate::transport::{self, TransportError};
use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that abort a consumer's build.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// A file-system operation failed; never retried.
    #[error("placement failed at {}: {source}", path.display())]
    Io {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The package's copy of the binary does not match the manifest.
    #[error("integrity check failed for {}: expected sha256 {expected}, found {actual}", path.display())]
    IntegrityMismatch {
        /// The package file that failed verification.
        path: PathBuf,
        /// Digest recorded in the manifest.
        expected: Sha256Digest,
        /// Digest of the file actually found.
        actual: Sha256Digest,
    },

    /// No binary serves the consumer's descriptor.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The package manifest is missing or invalid.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A transported package could not be unpacked.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

type Result<T> = std::result::Result<T, PlacementError>;

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> PlacementError + '_ {
    move |source| PlacementError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What the consumer's build asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerContext {
    /// The consumer's own target descriptor.
    pub target: ArchitectureDescriptor,
    /// Directory the binary is placed into.
    pub output_dir: PathBuf,
}

/// A package directory with its loaded manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    root: PathBuf,
    manifest: PackageManifest,
}

impl Package {
    /// Load the package rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError::Manifest`] if `manifest.json` is missing or
    /// invalid.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let manifest = manifest::load_manifest(&root.join(MANIFEST_FILE))?;
        debug!(
            target: "archpack::placement",
            "opened {} {} at {}",
            manifest.library(),
            manifest.version(),
            root.display()
        );
        Ok(Self { root, manifest })
    }

    /// Extract a transported `.tar.zst` package into `dest` and open it.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError::Transport`] if extraction fails, or any
    /// [`Package::open`] error.
    pub fn unpack(archive: &Path, dest: &Path) -> Result<Self> {
        transport::extract_archive(archive, dest)?;
        Self::open(dest)
    }

    /// Return the package root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the loaded manifest.
    #[must_use]
    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }
}

/// Whether placement wrote a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// The binary was copied into the output directory.
    Placed,
    /// An identical binary was already in place; nothing was written.
    Unchanged,
}

/// Details of a completed placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementResult {
    /// The consumer's descriptor.
    pub requested: ArchitectureDescriptor,
    /// The descriptor of the binary that was placed.
    pub resolved: ArchitectureDescriptor,
    /// Final path of the binary.
    pub path: PathBuf,
    /// Digest of the placed binary.
    pub sha256: Sha256Digest,
    /// Whether a debug request was served by the release build.
    pub fell_back_to_release: bool,
    /// Whether a file was written.
    pub outcome: PlacementOutcome,
}

/// Resolve `context.target` against `package` and place the binary.
///
/// # Errors
///
/// Returns [`PlacementError::Resolve`] when the package cannot serve the
/// descriptor, [`PlacementError::IntegrityMismatch`] when the package's copy
/// is corrupt, or [`PlacementError::Io`] on file-system failures. On error
/// the destination is left as it was.
pub fn resolve_and_place(package: &Package, context: &ConsumerContext) -> Result<PlacementResult> {
    let resolution = resolve(package.manifest(), context.target)?;
    let entry = resolution.entry;
    let dest = context.output_dir.join(entry.file_name());
    let result = |outcome| PlacementResult {
        requested: resolution.requested,
        resolved: resolution.resolved(),
        path: dest.clone(),
        sha256: entry.sha256().clone(),
        fell_back_to_release: resolution.fell_back_to_release,
        outcome,
    };

    if matches_digest(&dest, entry.sha256())? {
        debug!(
            target: "archpack::placement",
            "{} is already up to date",
            dest.display()
        );
        return Ok(result(PlacementOutcome::Unchanged));
    }

    let source = entry.resolve_in(package.root());
    fs::create_dir_all(&context.output_dir).map_err(io_at(&context.output_dir))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".archpack-")
        .tempfile_in(&context.output_dir)
        .map_err(io_at(&context.output_dir))?;
    let mut reader = fs::File::open(&source).map_err(io_at(&source))?;
    io::copy(&mut reader, temp.as_file_mut()).map_err(io_at(temp.path()))?;
    temp.as_file().sync_all().map_err(io_at(temp.path()))?;

    let actual = Sha256Digest::of_file(temp.path()).map_err(io_at(temp.path()))?;
    if &actual != entry.sha256() {
        return Err(PlacementError::IntegrityMismatch {
            path: source,
            expected: entry.sha256().clone(),
            actual,
        });
    }

    let permissions = reader
        .metadata()
        .map_err(io_at(&source))?
        .permissions();
    fs::set_permissions(temp.path(), permissions).map_err(io_at(temp.path()))?;
    temp.persist(&dest)
        .map_err(|err| PlacementError::Io {
            path: dest.clone(),
            source: err.error,
        })?;

    info!(
        target: "archpack::placement",
        "placed {} for {} at {}",
        resolution.resolved(),
        resolution.requested,
        dest.display()
    );
    Ok(result(PlacementOutcome::Placed))
}

/// Whether `path` exists and hashes to `expected`.
fn matches_digest(path: &Path, expected: &Sha256Digest) -> Result<bool> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => {
            Ok(Sha256Digest::of_file(path).map_err(io_at(path))? == *expected)
        }
        Ok(_) => Ok(false),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(io_at(path)(err)),
    }
}

#[cfg(test)]
#[path = "placement_tests.rs"]
mod tests;
