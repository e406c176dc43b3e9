//! Test support shared by the integration suites.
//!
//! Packages are produced the way `archpack package` produces them: the
//! scripted toolchain builds every descriptor, then the assembler stages the
//! result.

use archpack::assembler::{AssembledPackage, PackageAssembler};
use archpack::builder::{ArtifactBuilder, BuildConfig};
use archpack::manifest::LibraryName;
use archpack::matrix::{BuildMatrix, MatrixOutcome};
use archpack::source::SourceProvenance;
use archpack::test_utils::{ScriptedToolchain, write_source_tree};
use std::path::Path;

/// File name every test package declares for its binary.
pub const FILE_NAME: &str = "sqlite3.dll";

/// Build `matrix` for `library` at `version` under `root` and stage the
/// package at `root/dist/<library>`.
pub fn build_package(
    root: &Path,
    library: &str,
    version: &str,
    matrix: BuildMatrix,
) -> AssembledPackage {
    let source_dir = write_source_tree(root, version).expect("source tree");
    let provenance = SourceProvenance::read(&source_dir, "VERSION").expect("provenance");
    let release_version = provenance.version().clone();
    let builder = ArtifactBuilder::new(
        BuildConfig {
            build_dir: root.join("build"),
            file_name: FILE_NAME.to_owned(),
            source_date_epoch: 0,
            verify_reproducible: false,
        },
        provenance,
        Box::new(ScriptedToolchain::new()),
    );
    let MatrixOutcome::AllSucceeded(completed) = matrix.run(&builder).expect("worker pool")
    else {
        panic!("scripted builds succeed");
    };
    let library = LibraryName::try_from(library).expect("valid library name");
    let staging_dir = root.join("dist").join(library.as_str());
    PackageAssembler::new(library, staging_dir)
        .assemble(&completed, &release_version)
        .expect("assemble")
}
