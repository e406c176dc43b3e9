//! Top-level error type for the `archpack` CLI.
//!
//! Each concern keeps its own error enum; [`ArchpackError`] aggregates them
//! so a command can propagate any failure with `?` and print one line.

use crate::assembler::AssemblyError;
use crate::config::ConfigError;
use crate::descriptor::ArchitectureDescriptor;
use crate::manifest::ManifestError;
use crate::matrix::{BuildFailure, MatrixError};
use crate::placement::PlacementError;
use crate::source::SourceError;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors that can occur while running an `archpack` command.
#[derive(Debug, Error)]
pub enum ArchpackError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The native source or its version file is invalid.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The worker pool could not be started.
    #[error(transparent)]
    Matrix(#[from] MatrixError),

    /// At least one descriptor failed to build; no package was produced.
    #[error("build matrix failed for {} descriptor(s):\n{}", failures.len(), describe_failures(failures))]
    BuildMatrixFailed {
        /// Every failure, in descriptor order.
        failures: Vec<BuildFailure>,
    },

    /// Package assembly failed.
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    /// A manifest could not be read.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A package archive could not be read or written.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Consumer-side placement failed.
    #[error(transparent)]
    Placement(#[from] PlacementError),

    /// The host architecture is not a packaged architecture, and `--arch`
    /// was not given.
    #[error("host architecture {host} is not supported; pass --arch explicitly")]
    UnsupportedHost {
        /// Value of `std::env::consts::ARCH`.
        host: &'static str,
    },

    /// A scratch directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output could not be written.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl ArchpackError {
    /// Descriptors that failed to build, when this is a matrix failure.
    #[must_use]
    pub fn failed_descriptors(&self) -> Vec<ArchitectureDescriptor> {
        match self {
            Self::BuildMatrixFailed { failures } => {
                failures.iter().map(|failure| failure.descriptor).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn describe_failures(failures: &[BuildFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("  {failure}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convenience alias for results using [`ArchpackError`].
pub type Result<T> = std::result::Result<T, ArchpackError>;
