//! `archpack` CLI entrypoint.
//!
//! `archpack package` runs on the producer side: it builds the matrix and
//! stages the package. `archpack place` and `archpack inspect` run wherever
//! a package is consumed.

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

use archpack::assembler::PackageAssembler;
use archpack::builder::{ArtifactBuilder, BuildConfig};
use archpack::cli::{Cli, Command, InspectArgs, PackageArgs, PlaceArgs};
use archpack::config::ArchpackConfig;
use archpack::descriptor::{Architecture, ArchitectureDescriptor};
use archpack::error::{ArchpackError, Result};
use archpack::manifest;
use archpack::matrix::{BuildMatrix, MatrixOutcome};
use archpack::output::{manifest_summary, package_summary, placement_summary};
use archpack::placement::{ConsumerContext, Package, resolve_and_place};
use archpack::source::{SourceProvenance, SourceVersion};
use archpack::transport;
use camino::Utf8Path;
use clap::Parser;
use std::io::Write;
use tempfile::TempDir;

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_filter())
        .parse_default_env()
        .init();

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stdout, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, stdout: &mut dyn Write, stderr: &mut dyn Write) -> Result<()> {
    match &cli.command {
        Command::Package(args) => run_package(args, cli.quiet, stderr),
        Command::Place(args) => run_place(args, cli.quiet, stderr),
        Command::Inspect(args) => run_inspect(args, stdout),
    }
}

/// Builds every descriptor and stages the package.
fn run_package(args: &PackageArgs, quiet: bool, stderr: &mut dyn Write) -> Result<()> {
    let config_path = ArchpackConfig::locate(args.config.as_deref());
    let config = ArchpackConfig::load(&config_path)?;
    let provenance =
        SourceProvenance::read(config.source_dir.as_std_path(), &config.version_file)?;
    let release_version = match &args.release_version {
        Some(value) => SourceVersion::parse(value)?,
        None => provenance.version().clone(),
    };

    let mut matrix = BuildMatrix::required();
    if args.include_debug || config.include_debug {
        matrix = matrix.with_debug();
    }
    let matrix = matrix.with_jobs(args.jobs.or(config.jobs));

    if !quiet {
        write_stderr_line(
            stderr,
            format!(
                "Building {} {} for {} descriptor(s)...",
                config.library,
                provenance.version(),
                matrix.descriptors().count()
            ),
        );
    }

    let builder = ArtifactBuilder::new(
        BuildConfig {
            build_dir: config.build_dir.clone().into_std_path_buf(),
            file_name: config.file_name.clone(),
            source_date_epoch: config.source_date_epoch,
            verify_reproducible: args.verify_reproducible,
        },
        provenance,
        Box::new(config.toolchain()),
    );
    let completed = match matrix.run(&builder)? {
        MatrixOutcome::AllSucceeded(completed) => completed,
        MatrixOutcome::PartialFailure(failures) => {
            return Err(ArchpackError::BuildMatrixFailed { failures });
        }
    };

    let staging_dir = args
        .staging_dir
        .clone()
        .unwrap_or_else(|| config.staging_dir.clone());
    if !quiet {
        write_stderr_line(stderr, format!("Staging package to {staging_dir}..."));
    }
    let package = PackageAssembler::new(config.library.clone(), staging_dir.into_std_path_buf())
        .with_archive(args.archive)
        .assemble(&completed, &release_version)?;

    if !quiet {
        write_stderr_line(stderr, package_summary(&package));
    }
    Ok(())
}

/// Places the binary matching the consumer's descriptor.
fn run_place(args: &PlaceArgs, quiet: bool, stderr: &mut dyn Write) -> Result<()> {
    let architecture = match args.arch {
        Some(architecture) => architecture,
        None => Architecture::host().ok_or(ArchpackError::UnsupportedHost {
            host: std::env::consts::ARCH,
        })?,
    };
    let (package, _scratch) = open_package(&args.package)?;
    let context = ConsumerContext {
        target: ArchitectureDescriptor::new(architecture, args.configuration),
        output_dir: args.output_dir.clone().into_std_path_buf(),
    };
    let result = resolve_and_place(&package, &context)?;

    if !quiet {
        write_stderr_line(stderr, placement_summary(&result));
    }
    Ok(())
}

/// Prints a package manifest to stdout.
fn run_inspect(args: &InspectArgs, stdout: &mut dyn Write) -> Result<()> {
    let (package, _scratch) = open_package(&args.package)?;
    let text = if args.json {
        manifest::to_json(package.manifest())?
    } else {
        format!("{}\n", manifest_summary(package.manifest()))
    };
    stdout
        .write_all(text.as_bytes())
        .map_err(|source| ArchpackError::WriteFailed { source })
}

/// Opens a package directory, or unpacks an archive into a scratch
/// directory that lives as long as the returned [`TempDir`].
fn open_package(path: &Utf8Path) -> Result<(Package, Option<TempDir>)> {
    if transport::is_archive(path.as_std_path()) {
        let scratch = tempfile::Builder::new().prefix(".archpack-").tempdir()?;
        let package = Package::unpack(path.as_std_path(), scratch.path())?;
        Ok((package, Some(scratch)))
    } else {
        Ok((Package::open(path.as_std_path())?, None))
    }
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            1
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}
