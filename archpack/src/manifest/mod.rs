//! Package manifest: the per-release index of every packaged binary.
//!
//! A package root holds `manifest.json` and one binary per descriptor at
//! `<architecture>/<configuration>/<file_name>`. The manifest records each
//! entry's relative path, SHA-256 digest and size together with the library
//! identifier and the release version.
//!
//! # Sub-modules
//!
//! - [`error`] - Construction and parse errors.
//! - [`library_name`] - Library identifier newtype.
//! - [`parser`] - JSON reading and writing.
//! - [`schema_version`] - Schema version newtype.

pub mod error;
pub mod library_name;
pub mod parser;
pub mod schema_version;

pub use error::ManifestError;
pub use library_name::LibraryName;
pub use parser::{load_manifest, parse_manifest, to_json};
pub use schema_version::SchemaVersion;

use crate::descriptor::ArchitectureDescriptor;
use crate::digest::Sha256Digest;
use crate::source::SourceVersion;
use error::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name of the manifest at the package root.
pub const MANIFEST_FILE: &str = "manifest.json";

/// One packaged binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    descriptor: ArchitectureDescriptor,
    path: String,
    sha256: Sha256Digest,
    size_bytes: u64,
}

impl ManifestEntry {
    /// Create an entry, validating the relative path.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::UnsafePath`] if `path` is empty, absolute,
    /// uses `\` separators, or contains empty, `.` or `..` components.
    pub fn new(
        descriptor: ArchitectureDescriptor,
        path: impl Into<String>,
        sha256: Sha256Digest,
        size_bytes: u64,
    ) -> Result<Self> {
        let path = path.into();
        validate_entry_path(&path)?;
        Ok(Self {
            descriptor,
            path,
            sha256,
            size_bytes,
        })
    }

    /// The package-relative path for a binary, e.g. `x64/release/sqlite3.dll`.
    #[must_use]
    pub fn layout_path(descriptor: ArchitectureDescriptor, file_name: &str) -> String {
        format!(
            "{}/{}/{file_name}",
            descriptor.architecture(),
            descriptor.configuration()
        )
    }

    /// Return the descriptor this binary was built for.
    #[must_use]
    pub fn descriptor(&self) -> ArchitectureDescriptor {
        self.descriptor
    }

    /// Return the `/`-separated path relative to the package root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Return the declared file name: the last path component.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Return the expected digest of the binary.
    #[must_use]
    pub fn sha256(&self) -> &Sha256Digest {
        &self.sha256
    }

    /// Return the expected size of the binary.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Resolve the entry against a package root on the local file system.
    #[must_use]
    pub fn resolve_in(&self, root: &Path) -> PathBuf {
        self.path
            .split('/')
            .fold(root.to_path_buf(), |acc, component| acc.join(component))
    }
}

fn validate_entry_path(path: &str) -> Result<()> {
    let reject = |reason: &str| ManifestError::UnsafePath {
        path: path.to_owned(),
        reason: reason.to_owned(),
    };
    if path.is_empty() {
        return Err(reject("path is empty"));
    }
    if path.contains('\\') {
        return Err(reject("path must use '/' separators"));
    }
    if path.starts_with('/') || path.contains(':') {
        return Err(reject("path must be relative"));
    }
    for component in path.split('/') {
        match component {
            "" => return Err(reject("path has an empty component")),
            "." | ".." => return Err(reject("path must not contain '.' or '..' components")),
            _ => {}
        }
    }
    Ok(())
}

/// The validated, immutable manifest of one released package.
///
/// # Examples
///
/// ```
/// use archpack::descriptor::{Architecture, ArchitectureDescriptor};
/// use archpack::digest::Sha256Digest;
/// use archpack::manifest::{LibraryName, ManifestEntry, PackageManifest};
/// use archpack::source::SourceVersion;
///
/// let descriptor = ArchitectureDescriptor::release(Architecture::X64);
/// let entry = ManifestEntry::new(
///     descriptor,
///     "x64/release/sqlite3.dll",
///     Sha256Digest::of_bytes(b"binary"),
///     6,
/// )
/// .expect("valid entry");
/// let manifest = PackageManifest::new(
///     LibraryName::try_from("sqlite3").expect("valid name"),
///     SourceVersion::parse("3.45.0").expect("valid version"),
///     vec![entry],
/// )
/// .expect("valid manifest");
/// assert_eq!(manifest.entry(descriptor).map(|e| e.file_name()), Some("sqlite3.dll"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    schema_version: SchemaVersion,
    library: LibraryName,
    version: SourceVersion,
    entries: BTreeMap<ArchitectureDescriptor, ManifestEntry>,
}

impl PackageManifest {
    /// Build a current-schema manifest from its entries.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::DuplicateEntry`] if two entries share a
    /// descriptor.
    pub fn new(
        library: LibraryName,
        version: SourceVersion,
        entries: impl IntoIterator<Item = ManifestEntry>,
    ) -> Result<Self> {
        Self::with_schema(SchemaVersion::current(), library, version, entries)
    }

    pub(crate) fn with_schema(
        schema_version: SchemaVersion,
        library: LibraryName,
        version: SourceVersion,
        entries: impl IntoIterator<Item = ManifestEntry>,
    ) -> Result<Self> {
        let mut by_descriptor = BTreeMap::new();
        for entry in entries {
            let descriptor = entry.descriptor;
            if by_descriptor.insert(descriptor, entry).is_some() {
                return Err(ManifestError::DuplicateEntry { descriptor });
            }
        }
        Ok(Self {
            schema_version,
            library,
            version,
            entries: by_descriptor,
        })
    }

    /// Return the schema version.
    #[must_use]
    pub fn schema_version(&self) -> SchemaVersion {
        self.schema_version
    }

    /// Return the library identifier.
    #[must_use]
    pub fn library(&self) -> &LibraryName {
        &self.library
    }

    /// Return the release version.
    #[must_use]
    pub fn version(&self) -> &SourceVersion {
        &self.version
    }

    /// Look up the entry for `descriptor`.
    #[must_use]
    pub fn entry(&self, descriptor: ArchitectureDescriptor) -> Option<&ManifestEntry> {
        self.entries.get(&descriptor)
    }

    /// Iterate the entries in descriptor order.
    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    /// Iterate the packaged descriptors in order.
    pub fn descriptors(&self) -> impl Iterator<Item = ArchitectureDescriptor> + '_ {
        self.entries.keys().copied()
    }
}
