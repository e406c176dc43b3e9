//! Library identifier recorded in the manifest.
//!
//! The name ends up in archive file names, so it is limited to a
//! conservative character set.

use super::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated library identifier such as `sqlite3`.
///
/// Allowed characters are ASCII alphanumerics plus `.`, `_`, `+` and `-`;
/// the name may not begin with `.` or `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LibraryName(String);

impl LibraryName {
    /// Return the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(value: &str) -> Result<()> {
    let reject = |reason: &str| ManifestError::InvalidLibraryName {
        value: value.to_owned(),
        reason: reason.to_owned(),
    };
    let Some(first) = value.chars().next() else {
        return Err(reject("name must not be empty"));
    };
    if first == '.' || first == '-' {
        return Err(reject("name must not start with '.' or '-'"));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-')))
    {
        return Err(ManifestError::InvalidLibraryName {
            value: value.to_owned(),
            reason: format!("character '{bad}' is not allowed"),
        });
    }
    Ok(())
}

impl TryFrom<&str> for LibraryName {
    type Error = ManifestError;

    fn try_from(value: &str) -> Result<Self> {
        validate(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for LibraryName {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self> {
        validate(&value)?;
        Ok(Self(value))
    }
}

impl From<LibraryName> for String {
    fn from(name: LibraryName) -> Self {
        name.0
    }
}

impl AsRef<str> for LibraryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LibraryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("sqlite3")]
    #[case::punctuated("lib_foo-2.0+ms")]
    fn accepts_conservative_names(#[case] value: &str) {
        assert_eq!(
            LibraryName::try_from(value).expect("valid").as_str(),
            value
        );
    }

    #[rstest]
    #[case::empty("")]
    #[case::hidden(".sqlite")]
    #[case::flag_like("-rf")]
    #[case::separator("sqlite/3")]
    #[case::space("sq lite")]
    fn rejects_unsafe_names(#[case] value: &str) {
        assert!(matches!(
            LibraryName::try_from(value),
            Err(ManifestError::InvalidLibraryName { .. })
        ));
    }
}
