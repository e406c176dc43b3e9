//! Schema version newtype for `manifest.json`.
//!
//! Additive manifest changes bump the version. Readers reject versions newer
//! than [`SchemaVersion::current`] as well as the reserved value `0`.

use super::error::{ManifestError, Result};
use std::fmt;
use std::ops::RangeInclusive;

/// Schema versions this build reads. The upper bound is also what it writes.
const READABLE: RangeInclusive<u32> = 1..=1;

/// Manifest schema version within the readable range.
///
/// # Examples
///
/// ```
/// use archpack::manifest::SchemaVersion;
///
/// assert_eq!(u32::from(SchemaVersion::current()), 1);
/// assert!(SchemaVersion::try_from(2_u32).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaVersion(u32);

impl SchemaVersion {
    /// Return the version written by this build.
    #[must_use]
    pub const fn current() -> Self {
        Self(*READABLE.end())
    }

    /// Numeric form, as written to `manifest.json`.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::current()
    }
}

impl TryFrom<u32> for SchemaVersion {
    type Error = ManifestError;

    fn try_from(value: u32) -> Result<Self> {
        READABLE
            .contains(&value)
            .then_some(Self(value))
            .ok_or(ManifestError::UnsupportedSchemaVersion {
                value,
                max: *READABLE.end(),
            })
    }
}

impl From<SchemaVersion> for u32 {
    fn from(schema: SchemaVersion) -> Self {
        schema.as_u32()
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
