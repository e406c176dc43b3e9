//! Consumer-side selection of a packaged binary.
//!
//! Resolution matches the consumer's descriptor exactly. A missing debug
//! build degrades to the release build of the same architecture with a
//! warning; nothing ever crosses architectures, and release requests never
//! fall back to debug.

use crate::descriptor::{ArchitectureDescriptor, Configuration, join_descriptors};
use crate::manifest::{ManifestEntry, PackageManifest};
use log::warn;
use thiserror::Error;

/// Errors raised while resolving a consumer's descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The package has no usable binary for the requested descriptor.
    #[error(
        "package has no binary for {requested}; available: {}",
        describe_available(available)
    )]
    UnsupportedArchitecture {
        /// The consumer's descriptor.
        requested: ArchitectureDescriptor,
        /// Every descriptor the package does contain, in order.
        available: Vec<ArchitectureDescriptor>,
    },
}

/// The entry selected for a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    /// The consumer's descriptor.
    pub requested: ArchitectureDescriptor,
    /// The selected manifest entry.
    pub entry: &'a ManifestEntry,
    /// Whether a debug request was served by the release build.
    pub fell_back_to_release: bool,
}

impl Resolution<'_> {
    /// The descriptor of the selected entry.
    #[must_use]
    pub fn resolved(&self) -> ArchitectureDescriptor {
        self.entry.descriptor()
    }
}

/// Select the entry of `manifest` that serves `requested`.
///
/// # Errors
///
/// Returns [`ResolveError::UnsupportedArchitecture`] when neither an exact
/// match nor, for debug requests, a release build of the same architecture
/// exists.
///
/// # Examples
///
/// ```
/// use archpack::descriptor::{Architecture, ArchitectureDescriptor};
/// use archpack::digest::Sha256Digest;
/// use archpack::manifest::{LibraryName, ManifestEntry, PackageManifest};
/// use archpack::resolver::resolve;
/// use archpack::source::SourceVersion;
///
/// let release = ArchitectureDescriptor::release(Architecture::Arm64);
/// let entry = ManifestEntry::new(release, "arm64/release/z.so", Sha256Digest::of_bytes(b"z"), 1)
///     .expect("valid entry");
/// let manifest = PackageManifest::new(
///     LibraryName::try_from("z").expect("valid name"),
///     SourceVersion::parse("1.3.1").expect("valid version"),
///     vec![entry],
/// )
/// .expect("valid manifest");
///
/// let resolution = resolve(&manifest, ArchitectureDescriptor::debug(Architecture::Arm64))
///     .expect("release fallback");
/// assert!(resolution.fell_back_to_release);
/// assert_eq!(resolution.resolved(), release);
/// assert!(resolve(&manifest, ArchitectureDescriptor::release(Architecture::X64)).is_err());
/// ```
pub fn resolve(
    manifest: &PackageManifest,
    requested: ArchitectureDescriptor,
) -> Result<Resolution<'_>, ResolveError> {
    let (entry, fell_back_to_release) = match requested.configuration() {
        Configuration::Release => (manifest.entry(requested), false),
        Configuration::Debug => match manifest.entry(requested) {
            Some(entry) => (Some(entry), false),
            None => {
                let release = requested.with_configuration(Configuration::Release);
                let entry = manifest.entry(release);
                if entry.is_some() {
                    warn!(
                        target: "archpack::resolver",
                        "{} {} has no {requested} binary; falling back to {release}",
                        manifest.library(),
                        manifest.version()
                    );
                }
                (entry, true)
            }
        },
    };

    let entry = entry.ok_or_else(|| ResolveError::UnsupportedArchitecture {
        requested,
        available: manifest.descriptors().collect(),
    })?;
    Ok(Resolution {
        requested,
        entry,
        fell_back_to_release,
    })
}

fn describe_available(available: &[ArchitectureDescriptor]) -> String {
    if available.is_empty() {
        "none".to_owned()
    } else {
        join_descriptors(available)
    }
}
