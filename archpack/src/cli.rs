//! CLI argument definitions for `archpack`.
//!
//! This module defines the command-line interface using clap. It is kept
//! apart from the binary so the parsing rules can be unit tested.

use crate::descriptor::{Architecture, Configuration};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::num::NonZeroUsize;

/// Build, package and place multi-architecture native libraries.
#[derive(Parser, Debug)]
#[command(name = "archpack")]
#[command(version, about)]
#[command(long_about = concat!(
    "Build, package and place multi-architecture native libraries.\n\n",
    "`archpack package` cross-compiles the native source for every required ",
    "architecture, verifies each binary against the source version, and ",
    "stages a package with a manifest. `archpack place` runs in a consumer's ",
    "build and copies the binary matching the consumer's architecture into ",
    "its output directory.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Build and stage the package described by ./archpack.toml:\n",
    "    $ archpack package\n\n",
    "  Also write a .tar.zst archive and include debug builds:\n",
    "    $ archpack package --archive --include-debug\n\n",
    "  Place the arm64 release binary into a consumer's output directory:\n",
    "    $ archpack place --package dist/sqlite3 --arch arm64 --output-dir out\n\n",
    "  Show what a package contains:\n",
    "    $ archpack inspect --package dist/sqlite3-3.45.0.tar.zst",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        global = true
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl Cli {
    /// Log level implied by `-q` and `-v`.
    ///
    /// Warnings are shown by default so a debug-to-release fallback is never
    /// silent; `-q` keeps only errors.
    #[must_use]
    pub fn log_filter(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build every descriptor and stage a package.
    Package(PackageArgs),

    /// Place the binary matching a consumer's architecture.
    Place(PlaceArgs),

    /// Print a package manifest.
    Inspect(InspectArgs),
}

/// Arguments for the package command.
#[derive(Parser, Debug, Clone, Default)]
pub struct PackageArgs {
    /// Configuration file [default: $ARCHPACK_CONFIG or ./archpack.toml].
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Version being released; must match the source's version file.
    #[arg(long, value_name = "VERSION")]
    pub release_version: Option<String>,

    /// Override the staging directory from the configuration.
    #[arg(short, long, value_name = "DIR")]
    pub staging_dir: Option<Utf8PathBuf>,

    /// Also build and package debug descriptors.
    #[arg(long)]
    pub include_debug: bool,

    /// Maximum number of concurrent builds.
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<NonZeroUsize>,

    /// Write a `.tar.zst` archive beside the staged package.
    #[arg(long)]
    pub archive: bool,

    /// Build each descriptor twice and reject differing binaries.
    #[arg(long)]
    pub verify_reproducible: bool,
}

/// Arguments for the place command.
#[derive(Parser, Debug, Clone)]
pub struct PlaceArgs {
    /// Package directory or `.tar.zst` archive.
    #[arg(short, long, value_name = "PATH")]
    pub package: Utf8PathBuf,

    /// Consumer architecture [default: host architecture].
    #[arg(short, long, value_name = "ARCH")]
    pub arch: Option<Architecture>,

    /// Consumer build configuration.
    #[arg(long, value_name = "CONFIG", default_value = "release")]
    pub configuration: Configuration,

    /// Directory the binary is placed into.
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Utf8PathBuf,
}

/// Arguments for the inspect command.
#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    /// Package directory or `.tar.zst` archive.
    #[arg(short, long, value_name = "PATH")]
    pub package: Utf8PathBuf,

    /// Print the manifest as JSON.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
