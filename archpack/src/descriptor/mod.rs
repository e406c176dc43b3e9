//! Architecture descriptors: the key every artifact is built and resolved by.
//!
//! # Sub-modules
//!
//! - [`architecture`] - Closed set of CPU architectures (`Architecture`).
//! - [`configuration`] - Debug/release build profile (`Configuration`).
//! - [`error`] - Parse errors for descriptor strings.

pub mod architecture;
pub mod configuration;
pub mod error;

pub use architecture::Architecture;
pub use configuration::Configuration;
pub use error::DescriptorError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The descriptors every package must contain: each architecture, release.
pub const REQUIRED_DESCRIPTORS: [ArchitectureDescriptor; 4] = [
    ArchitectureDescriptor::release(Architecture::X86),
    ArchitectureDescriptor::release(Architecture::X64),
    ArchitectureDescriptor::release(Architecture::Arm),
    ArchitectureDescriptor::release(Architecture::Arm64),
];

/// A (architecture, configuration) pair identifying one build target.
///
/// Descriptors order by architecture first and configuration second, which
/// is the order used for manifests and diagnostics.
///
/// # Examples
///
/// ```
/// use archpack::descriptor::{Architecture, ArchitectureDescriptor, Configuration};
///
/// let descriptor: ArchitectureDescriptor = "x64-release".parse().expect("valid descriptor");
/// assert_eq!(descriptor.architecture(), Architecture::X64);
/// assert_eq!(descriptor.configuration(), Configuration::Release);
/// assert_eq!(descriptor.to_string(), "x64-release");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArchitectureDescriptor {
    architecture: Architecture,
    configuration: Configuration,
}

impl ArchitectureDescriptor {
    /// Create a descriptor from its parts.
    #[must_use]
    pub const fn new(architecture: Architecture, configuration: Configuration) -> Self {
        Self {
            architecture,
            configuration,
        }
    }

    /// Shorthand for the release descriptor of `architecture`.
    #[must_use]
    pub const fn release(architecture: Architecture) -> Self {
        Self::new(architecture, Configuration::Release)
    }

    /// Shorthand for the debug descriptor of `architecture`.
    #[must_use]
    pub const fn debug(architecture: Architecture) -> Self {
        Self::new(architecture, Configuration::Debug)
    }

    /// Return the architecture component.
    #[must_use]
    pub const fn architecture(self) -> Architecture {
        self.architecture
    }

    /// Return the configuration component.
    #[must_use]
    pub const fn configuration(self) -> Configuration {
        self.configuration
    }

    /// Return this descriptor with the configuration replaced.
    #[must_use]
    pub const fn with_configuration(self, configuration: Configuration) -> Self {
        Self::new(self.architecture, configuration)
    }

    /// Whether this descriptor is part of [`REQUIRED_DESCRIPTORS`].
    #[must_use]
    pub fn is_required(self) -> bool {
        REQUIRED_DESCRIPTORS.contains(&self)
    }

    /// Every architecture × configuration pair, in descriptor order.
    #[must_use]
    pub fn all() -> Vec<Self> {
        Architecture::ALL
            .iter()
            .flat_map(|&arch| {
                Configuration::ALL
                    .iter()
                    .map(move |&configuration| Self::new(arch, configuration))
            })
            .collect()
    }
}

impl FromStr for ArchitectureDescriptor {
    type Err = DescriptorError;

    fn from_str(value: &str) -> error::Result<Self> {
        let (arch, configuration) =
            value
                .rsplit_once('-')
                .ok_or_else(|| DescriptorError::Malformed {
                    value: value.to_owned(),
                })?;
        Ok(Self::new(arch.parse()?, configuration.parse()?))
    }
}

impl fmt::Display for ArchitectureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.architecture, self.configuration)
    }
}

/// Render descriptors as a comma-separated list for messages.
#[must_use]
pub fn join_descriptors<'a>(descriptors: impl IntoIterator<Item = &'a ArchitectureDescriptor>) -> String {
    descriptors
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
