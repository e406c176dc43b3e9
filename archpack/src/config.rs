//! `archpack.toml` loading.
//!
//! The file describes one native library: where its source lives, what the
//! compiled binary is called, where packages are staged, and which compiler
//! command builds each architecture. Relative paths are resolved against the
//! directory containing the file, which is made absolute on load so that
//! compilers started in another working directory see the same paths.

use crate::descriptor::{Architecture, DescriptorError};
use crate::manifest::LibraryName;
use crate::source::DEFAULT_VERSION_FILE;
use crate::toolchain::{CommandToolchain, DEFAULT_TIMEOUT, ToolchainCommand};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::num::NonZeroUsize;
use std::time::Duration;
use thiserror::Error;

/// Configuration file looked up in the working directory by default.
pub const DEFAULT_CONFIG_FILE: &str = "archpack.toml";

/// Environment variable overriding the configuration file path.
pub const CONFIG_ENV: &str = "ARCHPACK_CONFIG";

/// Errors arising from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path to the configuration file.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path to the configuration file.
        path: Utf8PathBuf,
        /// The TOML parser's error.
        #[source]
        source: toml::de::Error,
    },

    /// A `[toolchains.<architecture>]` table names an unknown architecture.
    #[error("invalid toolchain table: {0}")]
    UnknownArchitecture(#[from] DescriptorError),

    /// Two toolchain tables resolve to the same architecture.
    #[error("toolchain for {architecture} is configured more than once")]
    DuplicateToolchain {
        /// The repeated architecture.
        architecture: Architecture,
    },

    /// The working directory needed to resolve a relative configuration
    /// path is unavailable or not UTF-8.
    #[error("cannot resolve {path} against the working directory: {source}")]
    WorkingDir {
        /// The relative configuration path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The declared binary file name is not a single path component.
    #[error("invalid file_name \"{value}\": must be a plain file name")]
    InvalidFileName {
        /// The rejected value.
        value: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    package: RawPackage,
    #[serde(default)]
    toolchains: BTreeMap<String, ToolchainCommand>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPackage {
    library: LibraryName,
    file_name: String,
    source_dir: Utf8PathBuf,
    #[serde(default = "default_version_file")]
    version_file: String,
    #[serde(default = "default_build_dir")]
    build_dir: Utf8PathBuf,
    #[serde(default)]
    staging_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    include_debug: bool,
    #[serde(default)]
    jobs: Option<NonZeroUsize>,
    #[serde(default)]
    source_date_epoch: u64,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_version_file() -> String {
    DEFAULT_VERSION_FILE.to_owned()
}

fn default_build_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("target/archpack")
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

/// Fully resolved packaging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchpackConfig {
    /// Library identifier recorded in the manifest.
    pub library: LibraryName,
    /// Declared file name of the compiled binary.
    pub file_name: String,
    /// Native source directory.
    pub source_dir: Utf8PathBuf,
    /// Name of the version file inside `source_dir`.
    pub version_file: String,
    /// Root of the per-descriptor build output directories.
    pub build_dir: Utf8PathBuf,
    /// Where the package is staged.
    pub staging_dir: Utf8PathBuf,
    /// Build debug descriptors in addition to the required release set.
    pub include_debug: bool,
    /// Optional bound on concurrent builds.
    pub jobs: Option<NonZeroUsize>,
    /// Value exported as `SOURCE_DATE_EPOCH`.
    pub source_date_epoch: u64,
    /// Timeout for each toolchain invocation.
    pub timeout: Duration,
    /// Compiler command per architecture.
    pub toolchains: BTreeMap<Architecture, ToolchainCommand>,
}

impl ArchpackConfig {
    /// Choose the configuration file: `explicit` if given, then
    /// `ARCHPACK_CONFIG`, then `archpack.toml` in the working directory.
    #[must_use]
    pub fn locate(explicit: Option<&Utf8Path>) -> Utf8PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        std::env::var(CONFIG_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| Utf8PathBuf::from(DEFAULT_CONFIG_FILE), Utf8PathBuf::from)
    }

    /// Read and resolve the configuration file at `path`.
    ///
    /// A relative `path` is taken from the current working directory, and
    /// every path in the result is absolute.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or fails
    /// validation.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let absolute = absolute_path(path)?;
        let base_dir = absolute.parent().unwrap_or(absolute.as_path());
        let config = Self::parse(&text, path, base_dir)?;
        debug!(
            target: "archpack::config",
            "loaded {path}: {} toolchains, staging at {}",
            config.toolchains.len(),
            config.staging_dir
        );
        Ok(config)
    }

    /// Parse configuration text, resolving relative paths against
    /// `base_dir`. `origin` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text fails validation.
    pub fn parse(text: &str, origin: &Utf8Path, base_dir: &Utf8Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        let package = raw.package;
        validate_file_name(&package.file_name)?;

        let mut toolchains = BTreeMap::new();
        for (key, command) in raw.toolchains {
            let architecture: Architecture = key.parse()?;
            if toolchains.insert(architecture, command).is_some() {
                return Err(ConfigError::DuplicateToolchain { architecture });
            }
        }

        let staging_dir = package
            .staging_dir
            .unwrap_or_else(|| Utf8PathBuf::from("dist").join(package.library.as_str()));
        Ok(Self {
            file_name: package.file_name,
            source_dir: resolve(base_dir, package.source_dir),
            version_file: package.version_file,
            build_dir: resolve(base_dir, package.build_dir),
            staging_dir: resolve(base_dir, staging_dir),
            include_debug: package.include_debug,
            jobs: package.jobs,
            source_date_epoch: package.source_date_epoch,
            timeout: Duration::from_secs(package.timeout_secs),
            library: package.library,
            toolchains,
        })
    }

    /// Build the toolchain described by the `[toolchains]` tables.
    #[must_use]
    pub fn toolchain(&self) -> CommandToolchain {
        CommandToolchain::new(self.toolchains.clone()).with_timeout(self.timeout)
    }
}

fn absolute_path(path: &Utf8Path) -> Result<Utf8PathBuf, ConfigError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let working_dir_error = |source| ConfigError::WorkingDir {
        path: path.to_path_buf(),
        source,
    };
    let cwd = std::env::current_dir().map_err(working_dir_error)?;
    let cwd = Utf8PathBuf::try_from(cwd).map_err(|err| working_dir_error(err.into_io_error()))?;
    Ok(cwd.join(path))
}

fn resolve(base_dir: &Utf8Path, path: Utf8PathBuf) -> Utf8PathBuf {
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

fn validate_file_name(value: &str) -> Result<(), ConfigError> {
    let plain = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', ':']);
    if plain {
        Ok(())
    } else {
        Err(ConfigError::InvalidFileName {
            value: value.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn minimal() -> &'static str {
        concat!(
            "[package]\n",
            "library = \"sqlite3\"\n",
            "file_name = \"sqlite3.dll\"\n",
            "source_dir = \"native/sqlite\"\n",
        )
    }

    fn parse(text: &str) -> Result<ArchpackConfig, ConfigError> {
        ArchpackConfig::parse(text, Utf8Path::new("archpack.toml"), Utf8Path::new("/work"))
    }

    #[rstest]
    fn applies_defaults_and_resolves_relative_paths(minimal: &str) {
        let config = parse(minimal).expect("valid config");
        assert_eq!(config.source_dir, Utf8Path::new("/work/native/sqlite"));
        assert_eq!(config.build_dir, Utf8Path::new("/work/target/archpack"));
        assert_eq!(config.staging_dir, Utf8Path::new("/work/dist/sqlite3"));
        assert_eq!(config.version_file, "VERSION");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.source_date_epoch, 0);
        assert!(!config.include_debug);
        assert!(config.jobs.is_none());
        assert!(config.toolchains.is_empty());
    }

    #[rstest]
    fn absolute_paths_are_kept(minimal: &str) {
        let text = minimal.replace("native/sqlite", "/opt/src/sqlite");
        let config = parse(&text).expect("valid config");
        assert_eq!(config.source_dir, Utf8Path::new("/opt/src/sqlite"));
    }

    #[rstest]
    fn toolchain_tables_accept_aliases(minimal: &str) {
        let text = format!(
            "{minimal}{}",
            concat!(
                "[toolchains.amd64]\n",
                "program = \"cl\"\n",
                "args = [\"/LD\", \"{source}/sqlite3.c\", \"/Fe:{output}\"]\n",
                "debug_args = [\"/Zi\"]\n",
                "env = { VSCMD_ARG_TGT_ARCH = \"x64\" }\n",
                "[toolchains.aarch64]\n",
                "program = \"clang\"\n",
            )
        );
        let config = parse(&text).expect("valid config");
        let x64 = config.toolchains.get(&Architecture::X64).expect("x64 toolchain");
        assert_eq!(x64.program, "cl");
        assert_eq!(x64.debug_args, ["/Zi"]);
        assert_eq!(x64.env.get("VSCMD_ARG_TGT_ARCH").map(String::as_str), Some("x64"));
        assert!(config.toolchains.contains_key(&Architecture::Arm64));
    }

    #[rstest]
    #[case::unknown_architecture("[toolchains.mips]\nprogram = \"cc\"\n")]
    #[case::duplicate_alias(
        "[toolchains.x64]\nprogram = \"cc\"\n[toolchains.amd64]\nprogram = \"cc\"\n"
    )]
    #[case::unknown_toolchain_key("[toolchains.x64]\nprogram = \"cc\"\nflags = []\n")]
    fn rejects_bad_toolchain_tables(minimal: &str, #[case] tables: &str) {
        assert!(parse(&format!("{minimal}{tables}")).is_err());
    }

    #[rstest]
    #[case::nested("lib/sqlite3.dll")]
    #[case::parent("..")]
    #[case::empty("")]
    fn rejects_non_plain_file_names(minimal: &str, #[case] file_name: &str) {
        let text = minimal.replace("sqlite3.dll", file_name);
        assert!(matches!(
            parse(&text),
            Err(ConfigError::InvalidFileName { .. })
        ));
    }

    #[rstest]
    fn rejects_unknown_package_keys(minimal: &str) {
        let text = format!("{minimal}compression = \"xz\"\n");
        assert!(matches!(parse(&text), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn locate_prefers_explicit_then_environment() {
        temp_env::with_var(CONFIG_ENV, Some("/etc/archpack/ci.toml"), || {
            assert_eq!(
                ArchpackConfig::locate(Some(Utf8Path::new("mine.toml"))),
                Utf8Path::new("mine.toml")
            );
            assert_eq!(
                ArchpackConfig::locate(None),
                Utf8Path::new("/etc/archpack/ci.toml")
            );
        });
        temp_env::with_var_unset(CONFIG_ENV, || {
            assert_eq!(ArchpackConfig::locate(None), Utf8Path::new(DEFAULT_CONFIG_FILE));
        });
    }

    #[test]
    fn load_resolves_against_the_file_directory() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        let path = root.join("archpack.toml");
        fs::write(
            &path,
            "[package]\nlibrary = \"z\"\nfile_name = \"libz.so\"\nsource_dir = \"zlib\"\n",
        )
        .expect("write config");

        let config = ArchpackConfig::load(&path).expect("load");
        assert_eq!(config.source_dir, root.join("zlib"));
        assert_eq!(config.staging_dir, root.join("dist/z"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = ArchpackConfig::load(Utf8Path::new("/nonexistent/archpack.toml"))
            .expect_err("absent");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
