//! CPU architectures a native artifact can be compiled for.
//!
//! The set is closed: adding an instruction set means adding a variant here
//! and letting the compiler point at every match that needs updating.

use super::error::{DescriptorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target instruction set of a native binary.
///
/// The wire form (manifest JSON, configuration keys, directory names) is the
/// lowercase short name returned by [`Architecture::as_str`].
///
/// # Examples
///
/// ```
/// use archpack::descriptor::Architecture;
///
/// let arch: Architecture = "aarch64".parse().expect("alias accepted");
/// assert_eq!(arch, Architecture::Arm64);
/// assert_eq!(arch.as_str(), "arm64");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// 32-bit x86.
    X86,
    /// 64-bit x86 (AMD64).
    X64,
    /// 32-bit ARM.
    Arm,
    /// 64-bit ARM (AArch64).
    Arm64,
}

impl Architecture {
    /// Every supported architecture, in descriptor order.
    pub const ALL: [Self; 4] = [Self::X86, Self::X64, Self::Arm, Self::Arm64];

    /// Return the canonical short name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::Arm => "arm",
            Self::Arm64 => "arm64",
        }
    }

    /// Detect the architecture of the running process.
    ///
    /// Returns `None` on instruction sets this tool does not package for.
    #[must_use]
    pub fn host() -> Option<Self> {
        match std::env::consts::ARCH {
            "x86" => Some(Self::X86),
            "x86_64" => Some(Self::X64),
            "arm" => Some(Self::Arm),
            "aarch64" => Some(Self::Arm64),
            _ => None,
        }
    }

    fn expected() -> String {
        Self::ALL
            .iter()
            .map(|arch| arch.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for Architecture {
    type Err = DescriptorError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "x86" | "i386" | "i686" | "win32" => Ok(Self::X86),
            "x64" | "x86_64" | "amd64" => Ok(Self::X64),
            "arm" | "armv7" => Ok(Self::Arm),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            _ => Err(DescriptorError::UnknownArchitecture {
                value: value.to_owned(),
                expected: Self::expected(),
            }),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
