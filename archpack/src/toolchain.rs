//! Toolchain invocation for per-architecture native builds.
//!
//! The [`Toolchain`] trait is the seam between the artifact builder and the
//! platform compiler. [`CommandToolchain`] runs a configured external command
//! per architecture, substituting the source directory, output path and
//! descriptor into its arguments, and enforces a timeout on each run.

use crate::descriptor::{Architecture, ArchitectureDescriptor, Configuration};
use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use wait_timeout::ChildExt;

/// Default timeout for a single toolchain invocation (30 minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1800);

/// Everything a toolchain needs to compile one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileInvocation {
    /// The target being compiled.
    pub descriptor: ArchitectureDescriptor,
    /// Directory holding the native source files.
    pub source_dir: PathBuf,
    /// Where the toolchain must write the compiled binary.
    pub output_path: PathBuf,
    /// Timestamp exported as `SOURCE_DATE_EPOCH` for reproducible output.
    pub source_date_epoch: u64,
}

/// Errors raised while running a toolchain.
#[derive(Debug, Error)]
pub enum ToolchainError {
    /// No compiler is configured for the descriptor's architecture.
    #[error("no toolchain configured for {descriptor}")]
    Unsupported {
        /// The descriptor that cannot be built.
        descriptor: ArchitectureDescriptor,
    },

    /// The toolchain program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The toolchain did not finish within the configured timeout.
    #[error("{program} timed out after {seconds} seconds")]
    TimedOut {
        /// The program that was killed.
        program: String,
        /// The timeout that elapsed.
        seconds: u64,
    },

    /// Waiting on or reading from the toolchain process failed.
    #[error("I/O error while running toolchain: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstraction over the platform compiler.
///
/// Implementations must be shareable across the build matrix's worker
/// threads.
#[cfg_attr(test, mockall::automock)]
pub trait Toolchain: Send + Sync {
    /// Whether a compiler is configured for `descriptor`.
    fn supports(&self, descriptor: ArchitectureDescriptor) -> bool;

    /// Compile one descriptor, writing the binary to
    /// `invocation.output_path`.
    ///
    /// A non-zero exit status is reported through the returned [`Output`],
    /// not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`ToolchainError`] when the compiler cannot be run to
    /// completion.
    fn compile(&self, invocation: &CompileInvocation) -> Result<Output, ToolchainError>;
}

impl<T: Toolchain + ?Sized> Toolchain for std::sync::Arc<T> {
    fn supports(&self, descriptor: ArchitectureDescriptor) -> bool {
        (**self).supports(descriptor)
    }

    fn compile(&self, invocation: &CompileInvocation) -> Result<Output, ToolchainError> {
        (**self).compile(invocation)
    }
}

/// A compiler command configured for one architecture.
///
/// Arguments may contain the placeholders `{source}`, `{output}`,
/// `{architecture}` and `{configuration}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainCommand {
    /// Program to execute.
    pub program: String,
    /// Arguments passed for every configuration.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra arguments appended for debug builds.
    #[serde(default)]
    pub debug_args: Vec<String>,
    /// Extra environment variables for the compiler process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ToolchainCommand {
    /// Expand the argument list for `invocation`.
    ///
    /// # Examples
    ///
    /// ```
    /// use archpack::descriptor::{Architecture, ArchitectureDescriptor};
    /// use archpack::toolchain::{CompileInvocation, ToolchainCommand};
    /// use std::collections::BTreeMap;
    ///
    /// let command = ToolchainCommand {
    ///     program: "cc".to_owned(),
    ///     args: vec!["{source}/lib.c".to_owned(), "-o".to_owned(), "{output}".to_owned()],
    ///     debug_args: vec!["-g".to_owned()],
    ///     env: BTreeMap::new(),
    /// };
    /// let invocation = CompileInvocation {
    ///     descriptor: ArchitectureDescriptor::debug(Architecture::X64),
    ///     source_dir: "src".into(),
    ///     output_path: "out.so".into(),
    ///     source_date_epoch: 0,
    /// };
    /// assert_eq!(command.expand_args(&invocation), ["src/lib.c", "-o", "out.so", "-g"]);
    /// ```
    #[must_use]
    pub fn expand_args(&self, invocation: &CompileInvocation) -> Vec<String> {
        let extra: &[String] = match invocation.descriptor.configuration() {
            Configuration::Debug => self.debug_args.as_slice(),
            Configuration::Release => &[],
        };
        self.args
            .iter()
            .chain(extra)
            .map(|arg| substitute(arg, invocation))
            .collect()
    }
}

fn substitute(template: &str, invocation: &CompileInvocation) -> String {
    template
        .replace("{source}", &invocation.source_dir.to_string_lossy())
        .replace("{output}", &invocation.output_path.to_string_lossy())
        .replace(
            "{architecture}",
            invocation.descriptor.architecture().as_str(),
        )
        .replace(
            "{configuration}",
            invocation.descriptor.configuration().as_str(),
        )
}

/// Runs a configured external command per architecture.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    commands: BTreeMap<Architecture, ToolchainCommand>,
    timeout: Duration,
}

impl CommandToolchain {
    /// Create a toolchain from per-architecture commands.
    #[must_use]
    pub fn new(commands: BTreeMap<Architecture, ToolchainCommand>) -> Self {
        Self {
            commands,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-invocation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_command(
        &self,
        command: &ToolchainCommand,
        invocation: &CompileInvocation,
    ) -> Command {
        let descriptor = invocation.descriptor;
        let mut cmd = Command::new(&command.program);
        cmd.args(command.expand_args(invocation))
            .current_dir(&invocation.source_dir)
            .env("SOURCE_DATE_EPOCH", invocation.source_date_epoch.to_string())
            .env("ARCHPACK_ARCHITECTURE", descriptor.architecture().as_str())
            .env("ARCHPACK_CONFIGURATION", descriptor.configuration().as_str())
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Toolchain for CommandToolchain {
    fn supports(&self, descriptor: ArchitectureDescriptor) -> bool {
        self.commands.contains_key(&descriptor.architecture())
    }

    fn compile(&self, invocation: &CompileInvocation) -> Result<Output, ToolchainError> {
        let Some(command) = self.commands.get(&invocation.descriptor.architecture()) else {
            return Err(ToolchainError::Unsupported {
                descriptor: invocation.descriptor,
            });
        };

        debug!(
            target: "archpack::toolchain",
            "{}: running {} {:?}",
            invocation.descriptor,
            command.program,
            command.expand_args(invocation)
        );

        let child = self
            .build_command(command, invocation)
            .spawn()
            .map_err(|source| ToolchainError::Spawn {
                program: command.program.clone(),
                source,
            })?;
        wait_with_timeout(child, &command.program, self.timeout)
    }
}

/// Wait for `child`, draining its pipes on helper threads so a chatty
/// compiler cannot block on a full pipe.
fn wait_with_timeout(
    mut child: Child,
    program: &str,
    timeout: Duration,
) -> Result<Output, ToolchainError> {
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let Some(status) = child.wait_timeout(timeout)? else {
        // Kill failures mean the process already exited; reap either way.
        if child.kill().is_err() {
            debug!(target: "archpack::toolchain", "{program} exited before kill");
        }
        child.wait()?;
        return Err(ToolchainError::TimedOut {
            program: program.to_owned(),
            seconds: timeout.as_secs(),
        });
    };

    Ok(Output {
        status,
        stdout: join_drain(stdout)?,
        stderr: join_drain(stderr)?,
    })
}

type DrainHandle = Option<JoinHandle<std::io::Result<Vec<u8>>>>;

fn drain(pipe: Option<impl Read + Send + 'static>) -> DrainHandle {
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            reader.read_to_end(&mut buffer)?;
            Ok(buffer)
        })
    })
}

fn join_drain(handle: DrainHandle) -> std::io::Result<Vec<u8>> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| std::io::Error::other("pipe reader thread panicked"))?,
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn command() -> ToolchainCommand {
        ToolchainCommand {
            program: "cc".to_owned(),
            args: vec![
                "-march={architecture}".to_owned(),
                "-DCONFIG={configuration}".to_owned(),
                "{source}/sqlite3.c".to_owned(),
                "-o".to_owned(),
                "{output}".to_owned(),
            ],
            debug_args: vec!["-g".to_owned()],
            env: BTreeMap::new(),
        }
    }

    fn invocation(descriptor: ArchitectureDescriptor) -> CompileInvocation {
        CompileInvocation {
            descriptor,
            source_dir: PathBuf::from("native"),
            output_path: PathBuf::from("out/lib.so"),
            source_date_epoch: 0,
        }
    }

    #[rstest]
    fn release_args_substitute_placeholders(command: ToolchainCommand) {
        let args = command.expand_args(&invocation(ArchitectureDescriptor::release(
            Architecture::Arm64,
        )));
        assert_eq!(
            args,
            [
                "-march=arm64",
                "-DCONFIG=release",
                "native/sqlite3.c",
                "-o",
                "out/lib.so"
            ]
        );
    }

    #[rstest]
    fn debug_args_are_appended_only_for_debug(command: ToolchainCommand) {
        let debug = command.expand_args(&invocation(ArchitectureDescriptor::debug(
            Architecture::X86,
        )));
        assert_eq!(debug.last().map(String::as_str), Some("-g"));

        let release = command.expand_args(&invocation(ArchitectureDescriptor::release(
            Architecture::X86,
        )));
        assert!(!release.contains(&"-g".to_owned()));
    }

    #[rstest]
    fn supports_only_configured_architectures(command: ToolchainCommand) {
        let toolchain = CommandToolchain::new(BTreeMap::from([(Architecture::X64, command)]));
        assert!(toolchain.supports(ArchitectureDescriptor::release(Architecture::X64)));
        assert!(toolchain.supports(ArchitectureDescriptor::debug(Architecture::X64)));
        assert!(!toolchain.supports(ArchitectureDescriptor::release(Architecture::Arm)));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let command = ToolchainCommand {
            program: "archpack-definitely-missing-compiler".to_owned(),
            args: Vec::new(),
            debug_args: Vec::new(),
            env: BTreeMap::new(),
        };
        let toolchain = CommandToolchain::new(BTreeMap::from([(Architecture::X64, command)]));
        let mut request = invocation(ArchitectureDescriptor::release(Architecture::X64));
        request.source_dir = std::env::temp_dir();

        let err = toolchain.compile(&request).expect_err("program is absent");
        assert!(matches!(err, ToolchainError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn captures_output_and_exit_status() {
        let command = ToolchainCommand {
            program: "sh".to_owned(),
            args: vec![
                "-c".to_owned(),
                "echo building $ARCHPACK_ARCHITECTURE >&2; exit 3".to_owned(),
            ],
            debug_args: Vec::new(),
            env: BTreeMap::new(),
        };
        let toolchain = CommandToolchain::new(BTreeMap::from([(Architecture::Arm, command)]));
        let mut request = invocation(ArchitectureDescriptor::release(Architecture::Arm));
        request.source_dir = std::env::temp_dir();

        let output = toolchain.compile(&request).expect("sh runs");
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "building arm");
    }

    #[cfg(unix)]
    #[test]
    fn kills_toolchain_after_timeout() {
        let command = ToolchainCommand {
            program: "sleep".to_owned(),
            args: vec!["5".to_owned()],
            debug_args: Vec::new(),
            env: BTreeMap::new(),
        };
        let toolchain = CommandToolchain::new(BTreeMap::from([(Architecture::X86, command)]))
            .with_timeout(Duration::from_millis(100));
        let mut request = invocation(ArchitectureDescriptor::release(Architecture::X86));
        request.source_dir = std::env::temp_dir();

        let err = toolchain.compile(&request).expect_err("sleep outlives timeout");
        assert!(matches!(err, ToolchainError::TimedOut { .. }));
    }
}
