//! Parallel build matrix orchestration.
//!
//! One rayon task runs per descriptor; the orchestrator joins them all before
//! deciding the outcome. Packaging only ever sees a [`CompletedMatrix`],
//! which this module alone can construct.

use crate::builder::{Artifact, ArtifactBuilder, BuildError, BuildOutcome};
use crate::descriptor::{
    Architecture, ArchitectureDescriptor, Configuration, REQUIRED_DESCRIPTORS, join_descriptors,
};
use log::{debug, info};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::num::NonZeroUsize;
use thiserror::Error;

/// Errors that prevent the matrix from running at all.
#[derive(Debug, Error)]
pub enum MatrixError {
    /// The bounded worker pool could not be created.
    #[error("failed to start build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// The set of descriptors to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMatrix {
    descriptors: BTreeSet<ArchitectureDescriptor>,
    jobs: Option<NonZeroUsize>,
}

impl BuildMatrix {
    /// A matrix over exactly the given descriptors.
    #[must_use]
    pub fn new(descriptors: impl IntoIterator<Item = ArchitectureDescriptor>) -> Self {
        Self {
            descriptors: descriptors.into_iter().collect(),
            jobs: None,
        }
    }

    /// The release build of every architecture.
    #[must_use]
    pub fn required() -> Self {
        Self::new(REQUIRED_DESCRIPTORS)
    }

    /// Add the debug build of every architecture.
    #[must_use]
    pub fn with_debug(mut self) -> Self {
        self.descriptors.extend(
            Architecture::ALL
                .into_iter()
                .map(|arch| ArchitectureDescriptor::new(arch, Configuration::Debug)),
        );
        self
    }

    /// Bound the number of concurrent builds; `None` uses rayon's global
    /// pool.
    #[must_use]
    pub fn with_jobs(mut self, jobs: Option<NonZeroUsize>) -> Self {
        self.jobs = jobs;
        self
    }

    /// Iterate the descriptors in order.
    pub fn descriptors(&self) -> impl Iterator<Item = ArchitectureDescriptor> + '_ {
        self.descriptors.iter().copied()
    }

    /// Build every descriptor in parallel and join the results.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError`] only if a bounded worker pool cannot be
    /// created. Build failures are reported through
    /// [`MatrixOutcome::PartialFailure`].
    pub fn run(&self, builder: &ArtifactBuilder) -> Result<MatrixOutcome, MatrixError> {
        let descriptors: Vec<_> = self.descriptors().collect();
        info!(
            target: "archpack::matrix",
            "building {} descriptors: {}",
            descriptors.len(),
            join_descriptors(&descriptors)
        );

        let build_all = || -> Vec<_> {
            descriptors
                .par_iter()
                .map(|&descriptor| builder.build(descriptor))
                .collect()
        };
        let results = match self.jobs {
            Some(jobs) => {
                debug!(target: "archpack::matrix", "using a pool of {jobs} build workers");
                rayon::ThreadPoolBuilder::new()
                    .num_threads(jobs.get())
                    .build()?
                    .install(build_all)
            }
            None => build_all(),
        };

        let mut artifacts = BTreeMap::new();
        let mut failures = Vec::new();
        for result in results {
            match result.outcome {
                BuildOutcome::Succeeded(artifact) => {
                    artifacts.insert(result.descriptor, artifact);
                }
                BuildOutcome::Failed(error) => failures.push(BuildFailure {
                    descriptor: result.descriptor,
                    error,
                }),
            }
        }

        if failures.is_empty() {
            info!(target: "archpack::matrix", "all {} builds succeeded", artifacts.len());
            return Ok(MatrixOutcome::AllSucceeded(CompletedMatrix { artifacts }));
        }
        failures.sort_by_key(|failure| failure.descriptor);
        info!(
            target: "archpack::matrix",
            "{} of {} builds failed",
            failures.len(),
            descriptors.len()
        );
        Ok(MatrixOutcome::PartialFailure(failures))
    }
}

impl Default for BuildMatrix {
    fn default() -> Self {
        Self::required()
    }
}

/// One descriptor that failed to build.
#[derive(Debug)]
pub struct BuildFailure {
    /// The descriptor that failed.
    pub descriptor: ArchitectureDescriptor,
    /// Why it failed.
    pub error: BuildError,
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.descriptor, self.error)
    }
}

/// Every artifact of a fully successful matrix run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedMatrix {
    artifacts: BTreeMap<ArchitectureDescriptor, Artifact>,
}

impl CompletedMatrix {
    /// Look up the artifact for `descriptor`.
    #[must_use]
    pub fn get(&self, descriptor: ArchitectureDescriptor) -> Option<&Artifact> {
        self.artifacts.get(&descriptor)
    }

    /// Iterate the artifacts in descriptor order.
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    /// Iterate the built descriptors in order.
    pub fn descriptors(&self) -> impl Iterator<Item = ArchitectureDescriptor> + '_ {
        self.artifacts.keys().copied()
    }

    /// Number of artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Whether the matrix produced no artifacts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Result of running a build matrix.
#[derive(Debug)]
pub enum MatrixOutcome {
    /// Every descriptor built.
    AllSucceeded(CompletedMatrix),
    /// At least one descriptor failed; failures are in descriptor order.
    PartialFailure(Vec<BuildFailure>),
}
