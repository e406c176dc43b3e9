//! Shared test utilities for the archpack crate.
//!
//! Available to unit tests and, through the `test-support` feature, to the
//! integration suites under `tests/`.

use crate::descriptor::{Architecture, ArchitectureDescriptor};
use crate::source::DEFAULT_VERSION_FILE;
use crate::toolchain::{CompileInvocation, Toolchain, ToolchainError};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::{Mutex, PoisonError};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// The bytes [`ScriptedToolchain`] writes for a descriptor.
#[must_use]
pub fn fake_binary(descriptor: ArchitectureDescriptor, source_date_epoch: u64) -> Vec<u8> {
    format!("fake native binary for {descriptor} built at {source_date_epoch}\n").into_bytes()
}

/// Create a native source tree under `root` whose version file holds
/// `version`, and return its path.
///
/// # Errors
///
/// Returns any I/O error raised while writing the tree.
pub fn write_source_tree(root: &Path, version: &str) -> std::io::Result<PathBuf> {
    let source_dir = root.join("native");
    fs::create_dir_all(&source_dir)?;
    fs::write(source_dir.join(DEFAULT_VERSION_FILE), format!("{version}\n"))?;
    fs::write(source_dir.join("library.c"), "int answer(void) { return 42; }\n")?;
    Ok(source_dir)
}

/// A toolchain that writes deterministic fake binaries instead of compiling.
///
/// Individual descriptors can be scripted to fail, to produce empty output
/// or to be unsupported, and every invocation is recorded.
#[derive(Debug, Default)]
pub struct ScriptedToolchain {
    failing: BTreeSet<ArchitectureDescriptor>,
    empty: BTreeSet<ArchitectureDescriptor>,
    unsupported: BTreeSet<Architecture>,
    nondeterministic: bool,
    invocations: Mutex<Vec<ArchitectureDescriptor>>,
}

impl ScriptedToolchain {
    /// A toolchain that builds every descriptor successfully.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the compiler exit with status 1 for `descriptor`.
    #[must_use]
    pub fn failing(mut self, descriptor: ArchitectureDescriptor) -> Self {
        self.failing.insert(descriptor);
        self
    }

    /// Make the compiler succeed without writing any bytes for `descriptor`.
    #[must_use]
    pub fn empty_output(mut self, descriptor: ArchitectureDescriptor) -> Self {
        self.empty.insert(descriptor);
        self
    }

    /// Report no compiler for `architecture`.
    #[must_use]
    pub fn without(mut self, architecture: Architecture) -> Self {
        self.unsupported.insert(architecture);
        self
    }

    /// Make every invocation produce different bytes.
    #[must_use]
    pub fn nondeterministic(mut self) -> Self {
        self.nondeterministic = true;
        self
    }

    /// Return the descriptors compiled so far, in invocation order.
    #[must_use]
    pub fn invocations(&self) -> Vec<ArchitectureDescriptor> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Toolchain for ScriptedToolchain {
    fn supports(&self, descriptor: ArchitectureDescriptor) -> bool {
        !self.unsupported.contains(&descriptor.architecture())
    }

    fn compile(&self, invocation: &CompileInvocation) -> Result<Output, ToolchainError> {
        let descriptor = invocation.descriptor;
        let count = {
            let mut invocations = self
                .invocations
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            invocations.push(descriptor);
            invocations.len()
        };

        if self.unsupported.contains(&descriptor.architecture()) {
            return Err(ToolchainError::Unsupported { descriptor });
        }
        if self.failing.contains(&descriptor) {
            return Ok(failure_output(&format!(
                "error: cross compiler for {descriptor} crashed\n"
            )));
        }
        if self.empty.contains(&descriptor) {
            fs::write(&invocation.output_path, b"")?;
            return Ok(success_output());
        }

        let mut bytes = fake_binary(descriptor, invocation.source_date_epoch);
        if self.nondeterministic {
            bytes.extend_from_slice(format!("invocation {count}\n").as_bytes());
        }
        fs::write(&invocation.output_path, bytes)?;
        Ok(success_output())
    }
}
