//! Build configurations.

use super::error::{DescriptorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Optimisation profile a native binary was compiled with.
///
/// `Release` artifacts are mandatory in every package; `Debug` artifacts are
/// optional and consumers asking for one may be given the release build.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Configuration {
    /// Unoptimised build with debug information.
    Debug,
    /// Optimised build shipped to consumers by default.
    #[default]
    Release,
}

impl Configuration {
    /// Every supported configuration, in descriptor order.
    pub const ALL: [Self; 2] = [Self::Debug, Self::Release];

    /// Return the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }
}

impl FromStr for Configuration {
    type Err = DescriptorError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            _ => Err(DescriptorError::UnknownConfiguration {
                value: value.to_owned(),
                expected: "debug, release".to_owned(),
            }),
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
