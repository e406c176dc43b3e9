//! Package manifest assembly and staging.
//!
//! The assembler turns a [`CompletedMatrix`] into a released package: it
//! checks the matrix covers every required descriptor and that each
//! artifact was built from the version being released, then writes the
//! package layout into a temporary sibling directory and renames it to the
//! staging path. A failure at any point leaves no staging directory behind.

use crate::descriptor::{ArchitectureDescriptor, REQUIRED_DESCRIPTORS, join_descriptors};
use crate::digest::Sha256Digest;
use crate::manifest::{
    self, LibraryName, MANIFEST_FILE, ManifestEntry, ManifestError, PackageManifest,
};
use crate::matrix::CompletedMatrix;
use crate::source::SourceVersion;
use crate::transport::{self, TransportError};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that abort packaging.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// One or more required descriptors have no artifact.
    #[error("build matrix is missing required descriptors: {}", join_descriptors(missing))]
    IncompleteMatrix {
        /// Required descriptors absent from the matrix, in order.
        missing: Vec<ArchitectureDescriptor>,
    },

    /// Artifacts were built from a different source version than the one
    /// being released.
    #[error(
        "version mismatch for {}: source records {expected}, release requested {actual}",
        join_descriptors(descriptors)
    )]
    VersionMismatch {
        /// Every offending descriptor, in order.
        descriptors: Vec<ArchitectureDescriptor>,
        /// The version recorded next to the source at build time.
        expected: SourceVersion,
        /// The release version supplied to the assembler.
        actual: SourceVersion,
    },

    /// The staging directory already exists; released packages are never
    /// overwritten.
    #[error("staging directory already exists: {}", path.display())]
    StagingExists {
        /// The existing staging path.
        path: PathBuf,
    },

    /// A copied binary does not hash to the artifact's digest.
    #[error("copy of {descriptor} is corrupt: expected sha256 {expected}, found {actual}")]
    CorruptCopy {
        /// The affected descriptor.
        descriptor: ArchitectureDescriptor,
        /// Digest recorded at build time.
        expected: Sha256Digest,
        /// Digest of the staged copy.
        actual: Sha256Digest,
    },

    /// A file-system operation failed while staging.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// The path being written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest could not be built or serialized.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The staged package could not be archived.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

type Result<T> = std::result::Result<T, AssemblyError>;

fn io_at(path: &Path) -> impl FnOnce(std::io::Error) -> AssemblyError + '_ {
    move |source| AssemblyError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A staged (and optionally archived) package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPackage {
    /// Root of the staged package directory.
    pub root: PathBuf,
    /// The manifest written to the package root.
    pub manifest: PackageManifest,
    /// Path to the `.tar.zst` archive, when one was requested.
    pub archive: Option<PathBuf>,
}

/// Writes released packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageAssembler {
    library: LibraryName,
    staging_dir: PathBuf,
    archive: bool,
}

impl PackageAssembler {
    /// Create an assembler writing `library` into `staging_dir`.
    #[must_use]
    pub fn new(library: LibraryName, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            library,
            staging_dir: staging_dir.into(),
            archive: false,
        }
    }

    /// Also write `<library>-<version>.tar.zst` beside the staging
    /// directory.
    #[must_use]
    pub fn with_archive(mut self, archive: bool) -> Self {
        self.archive = archive;
        self
    }

    /// Return the staging directory.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Build the manifest for `matrix` without touching the file system.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::IncompleteMatrix`] when required descriptors
    /// are missing and [`AssemblyError::VersionMismatch`] listing every
    /// artifact whose source version differs from `version`.
    pub fn manifest_for(
        &self,
        matrix: &CompletedMatrix,
        version: &SourceVersion,
    ) -> Result<PackageManifest> {
        check_complete(matrix)?;
        check_versions(matrix, version)?;
        let entries = matrix
            .artifacts()
            .map(|artifact| {
                ManifestEntry::new(
                    artifact.descriptor,
                    ManifestEntry::layout_path(artifact.descriptor, &artifact.file_name),
                    artifact.sha256.clone(),
                    artifact.size_bytes,
                )
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(PackageManifest::new(
            self.library.clone(),
            version.clone(),
            entries,
        )?)
    }

    /// Validate `matrix`, stage the package and optionally archive it.
    ///
    /// # Errors
    ///
    /// Any [`AssemblyError`]; on error no staging directory is left behind.
    pub fn assemble(
        &self,
        matrix: &CompletedMatrix,
        version: &SourceVersion,
    ) -> Result<AssembledPackage> {
        let manifest = self.manifest_for(matrix, version)?;
        if fs::symlink_metadata(&self.staging_dir).is_ok() {
            return Err(AssemblyError::StagingExists {
                path: self.staging_dir.clone(),
            });
        }

        let parent = parent_dir(&self.staging_dir);
        fs::create_dir_all(parent).map_err(io_at(parent))?;
        let archive_path = self
            .archive
            .then(|| parent.join(transport::archive_file_name(&self.library, version)));
        if let Some(path) = archive_path.as_deref().filter(|path| path.exists()) {
            return Err(AssemblyError::StagingExists {
                path: path.to_path_buf(),
            });
        }

        let scratch = tempfile::Builder::new()
            .prefix(".archpack-staging-")
            .tempdir_in(parent)
            .map_err(io_at(parent))?;
        stage_binaries(matrix, &manifest, scratch.path())?;
        let manifest_path = scratch.path().join(MANIFEST_FILE);
        fs::write(&manifest_path, manifest::to_json(&manifest)?)
            .map_err(io_at(&manifest_path))?;

        if let Some(path) = &archive_path {
            transport::create_archive(scratch.path(), path)?;
            info!(target: "archpack::assembler", "wrote {}", path.display());
        }

        if let Err(err) = fs::rename(scratch.path(), &self.staging_dir) {
            if let Some(path) = &archive_path {
                discard_archive(path);
            }
            return Err(io_at(&self.staging_dir)(err));
        }
        info!(
            target: "archpack::assembler",
            "staged {} {} with {} binaries at {}",
            self.library,
            version,
            manifest.entries().count(),
            self.staging_dir.display()
        );

        Ok(AssembledPackage {
            root: self.staging_dir.clone(),
            manifest,
            archive: archive_path,
        })
    }
}

/// Remove an archive whose staging directory could not be put in place.
fn discard_archive(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!(
            target: "archpack::assembler",
            "failed to remove {} after staging failed: {err}",
            path.display()
        );
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn check_complete(matrix: &CompletedMatrix) -> Result<()> {
    let missing: Vec<_> = REQUIRED_DESCRIPTORS
        .into_iter()
        .filter(|descriptor| matrix.get(*descriptor).is_none())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AssemblyError::IncompleteMatrix { missing })
    }
}

fn check_versions(matrix: &CompletedMatrix, version: &SourceVersion) -> Result<()> {
    let mismatched: Vec<_> = matrix
        .artifacts()
        .filter(|artifact| artifact.source_version != *version)
        .collect();
    // One builder produces the whole matrix, so mismatches share a version.
    let Some(first) = mismatched.first() else {
        return Ok(());
    };
    Err(AssemblyError::VersionMismatch {
        descriptors: mismatched.iter().map(|artifact| artifact.descriptor).collect(),
        expected: first.source_version.clone(),
        actual: version.clone(),
    })
}

fn stage_binaries(matrix: &CompletedMatrix, manifest: &PackageManifest, root: &Path) -> Result<()> {
    for entry in manifest.entries() {
        let Some(artifact) = matrix.get(entry.descriptor()) else {
            continue;
        };
        let dest = entry.resolve_in(root);
        if let Some(dir) = dest.parent() {
            fs::create_dir_all(dir).map_err(io_at(dir))?;
        }
        fs::copy(&artifact.binary_path, &dest).map_err(io_at(&artifact.binary_path))?;

        let actual = Sha256Digest::of_file(&dest).map_err(io_at(&dest))?;
        if actual != artifact.sha256 {
            return Err(AssemblyError::CorruptCopy {
                descriptor: artifact.descriptor,
                expected: artifact.sha256.clone(),
                actual,
            });
        }
        debug!(target: "archpack::assembler", "staged {}", entry.path());
    }
    Ok(())
}

#[cfg(test)]
#[path = "assembler_tests.rs"]
mod tests;
