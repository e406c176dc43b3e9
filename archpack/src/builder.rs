//! Per-descriptor artifact builds.
//!
//! The builder compiles the native source once for a descriptor. The
//! toolchain writes into a private temporary directory beside the final
//! location; only a successful, non-empty output is hashed and renamed into
//! `<build_dir>/<architecture>/<configuration>/<file_name>`. Every other
//! path ends in [`BuildOutcome::Failed`] with nothing left at the final
//! path.

use crate::descriptor::ArchitectureDescriptor;
use crate::digest::Sha256Digest;
use crate::source::{SourceProvenance, SourceVersion};
use crate::toolchain::{CompileInvocation, Toolchain, ToolchainError};
use log::{debug, error, info};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

/// Maximum number of stderr bytes kept in a compiler failure diagnostic.
const DIAGNOSTIC_LIMIT: usize = 4096;

/// Configuration for the artifact builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Root of the descriptor-scoped output directories.
    pub build_dir: PathBuf,
    /// Declared file name of the compiled binary.
    pub file_name: String,
    /// Timestamp exported to the toolchain as `SOURCE_DATE_EPOCH`.
    pub source_date_epoch: u64,
    /// Build every descriptor twice and fail it if the outputs differ.
    pub verify_reproducible: bool,
}

/// A compiled native binary for one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// The descriptor the binary was compiled for.
    pub descriptor: ArchitectureDescriptor,
    /// Location of the promoted binary.
    pub binary_path: PathBuf,
    /// Declared file name, preserved through packaging and placement.
    pub file_name: String,
    /// SHA-256 digest of the binary.
    pub sha256: Sha256Digest,
    /// Size of the binary in bytes.
    pub size_bytes: u64,
    /// Version recorded next to the source this binary was compiled from.
    pub source_version: SourceVersion,
}

/// Why a descriptor failed to build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// No compiler is configured for the descriptor, or it could not be
    /// run to completion.
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    /// The compiler exited unsuccessfully.
    #[error("compiler exited with {status}: {stderr}")]
    CompilerFailed {
        /// Human-readable exit status.
        status: String,
        /// Trimmed compiler stderr.
        stderr: String,
    },

    /// The compiler reported success but wrote no binary.
    #[error("compiler produced no output at {}", path.display())]
    MissingOutput {
        /// Where the binary was expected.
        path: PathBuf,
    },

    /// The compiler reported success but wrote an empty binary.
    #[error("compiler produced an empty binary")]
    EmptyOutput,

    /// Two builds of the same source produced different binaries.
    #[error("build is not reproducible: first sha256 {first}, second sha256 {second}")]
    NonReproducible {
        /// Digest of the first build.
        first: Sha256Digest,
        /// Digest of the second build.
        second: Sha256Digest,
    },

    /// A file-system operation failed while staging the output.
    #[error("I/O error while building: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of building one descriptor.
#[derive(Debug)]
pub enum BuildOutcome {
    /// The binary was compiled and promoted.
    Succeeded(Artifact),
    /// The build failed; no binary was promoted.
    Failed(BuildError),
}

/// Result of building a single descriptor.
#[derive(Debug)]
pub struct BuildResult {
    /// The descriptor that was built.
    pub descriptor: ArchitectureDescriptor,
    /// What happened.
    pub outcome: BuildOutcome,
}

/// A compiled but not yet promoted output.
struct PendingOutput {
    // Held so the temporary directory lives until promotion.
    _scratch: TempDir,
    path: PathBuf,
    sha256: Sha256Digest,
    size_bytes: u64,
}

/// Compiles the native source for individual descriptors.
pub struct ArtifactBuilder {
    config: BuildConfig,
    provenance: SourceProvenance,
    toolchain: Box<dyn Toolchain>,
}

impl ArtifactBuilder {
    /// Create a builder for the given source tree and toolchain.
    #[must_use]
    pub fn new(
        config: BuildConfig,
        provenance: SourceProvenance,
        toolchain: Box<dyn Toolchain>,
    ) -> Self {
        Self {
            config,
            provenance,
            toolchain,
        }
    }

    /// Return the builder configuration.
    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Return the provenance of the source being compiled.
    #[must_use]
    pub fn provenance(&self) -> &SourceProvenance {
        &self.provenance
    }

    /// Return the descriptor-scoped output directory.
    #[must_use]
    pub fn output_dir(&self, descriptor: ArchitectureDescriptor) -> PathBuf {
        self.config
            .build_dir
            .join(descriptor.architecture().as_str())
            .join(descriptor.configuration().as_str())
    }

    /// Build one descriptor.
    ///
    /// Never panics and never returns a partially written artifact: any
    /// failure is captured in [`BuildOutcome::Failed`].
    #[must_use]
    pub fn build(&self, descriptor: ArchitectureDescriptor) -> BuildResult {
        let outcome = match self.try_build(descriptor) {
            Ok(artifact) => {
                info!(
                    target: "archpack::builder",
                    "{descriptor}: built {} ({} bytes, sha256 {})",
                    artifact.file_name,
                    artifact.size_bytes,
                    artifact.sha256
                );
                BuildOutcome::Succeeded(artifact)
            }
            Err(err) => {
                error!(target: "archpack::builder", "{descriptor}: build failed: {err}");
                BuildOutcome::Failed(err)
            }
        };
        BuildResult {
            descriptor,
            outcome,
        }
    }

    fn try_build(&self, descriptor: ArchitectureDescriptor) -> Result<Artifact, BuildError> {
        if !self.toolchain.supports(descriptor) {
            return Err(ToolchainError::Unsupported { descriptor }.into());
        }

        let output_dir = self.output_dir(descriptor);
        fs::create_dir_all(&output_dir)?;
        let binary_path = output_dir.join(&self.config.file_name);
        remove_stale(&binary_path)?;

        let pending = self.compile_once(descriptor, &output_dir)?;
        if self.config.verify_reproducible {
            let second = self.compile_once(descriptor, &output_dir)?;
            if second.sha256 != pending.sha256 {
                return Err(BuildError::NonReproducible {
                    first: pending.sha256,
                    second: second.sha256,
                });
            }
            debug!(target: "archpack::builder", "{descriptor}: reproducibility check passed");
        }

        fs::rename(&pending.path, &binary_path)?;

        Ok(Artifact {
            descriptor,
            binary_path,
            file_name: self.config.file_name.clone(),
            sha256: pending.sha256,
            size_bytes: pending.size_bytes,
            source_version: self.provenance.version().clone(),
        })
    }

    fn compile_once(
        &self,
        descriptor: ArchitectureDescriptor,
        output_dir: &Path,
    ) -> Result<PendingOutput, BuildError> {
        let scratch = tempfile::Builder::new()
            .prefix(".archpack-")
            .tempdir_in(output_dir)?;
        // The compiler runs inside the source directory, so both paths it
        // receives must be absolute.
        let path = std::path::absolute(scratch.path().join(&self.config.file_name))?;
        let invocation = CompileInvocation {
            descriptor,
            source_dir: std::path::absolute(self.provenance.source_dir())?,
            output_path: path.clone(),
            source_date_epoch: self.config.source_date_epoch,
        };

        let output = self.toolchain.compile(&invocation)?;
        if !output.status.success() {
            return Err(BuildError::CompilerFailed {
                status: output.status.to_string(),
                stderr: diagnostic_text(&output.stderr),
            });
        }

        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(BuildError::MissingOutput { path }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BuildError::MissingOutput { path });
            }
            Err(e) => return Err(e.into()),
        };
        if metadata.len() == 0 {
            return Err(BuildError::EmptyOutput);
        }

        let sha256 = Sha256Digest::of_file(&path)?;
        Ok(PendingOutput {
            _scratch: scratch,
            path,
            sha256,
            size_bytes: metadata.len(),
        })
    }
}

/// Remove a binary left by an earlier build of the same descriptor.
fn remove_stale(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(target: "archpack::builder", "removed stale {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Trim compiler stderr to a bounded, single-string diagnostic.
fn diagnostic_text(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.len() <= DIAGNOSTIC_LIMIT {
        return trimmed.to_owned();
    }
    let mut cut = DIAGNOSTIC_LIMIT;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", trimmed.get(..cut).unwrap_or_default())
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
