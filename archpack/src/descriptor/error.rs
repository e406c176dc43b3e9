//! Error types for architecture descriptor parsing.
//!
//! Each variant names the rejected input and the accepted values so the
//! message can be shown to an operator unchanged.

use thiserror::Error;

/// Errors arising from invalid architecture or configuration strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// The architecture name is not one of the supported instruction sets.
    #[error("unsupported architecture \"{value}\"; expected one of: {expected}")]
    UnknownArchitecture {
        /// The rejected architecture string.
        value: String,
        /// Comma-separated list of accepted architecture names.
        expected: String,
    },

    /// The build configuration name is not recognised.
    #[error("unsupported build configuration \"{value}\"; expected one of: {expected}")]
    UnknownConfiguration {
        /// The rejected configuration string.
        value: String,
        /// Comma-separated list of accepted configuration names.
        expected: String,
    },

    /// The descriptor is not in `<architecture>-<configuration>` form.
    #[error("malformed descriptor \"{value}\"; expected <architecture>-<configuration>")]
    Malformed {
        /// The rejected descriptor string.
        value: String,
    },
}

/// Result type alias using [`DescriptorError`].
pub type Result<T> = std::result::Result<T, DescriptorError>;
