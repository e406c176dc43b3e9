//! Reading and writing `manifest.json`.
//!
//! The wire form is deserialized into plain structs first; validation then
//! runs through [`PackageManifest`]'s constructors so that parsed and
//! assembled manifests obey the same rules.

use super::error::{ManifestError, Result};
use super::{LibraryName, ManifestEntry, PackageManifest, SchemaVersion};
use crate::descriptor::ArchitectureDescriptor;
use crate::digest::Sha256Digest;
use crate::source::SourceVersion;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct RawManifest {
    schema_version: u32,
    library: String,
    version: String,
    entries: Vec<RawEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawEntry {
    #[serde(flatten)]
    descriptor: ArchitectureDescriptor,
    path: String,
    sha256: Sha256Digest,
    size_bytes: u64,
}

impl TryFrom<RawManifest> for PackageManifest {
    type Error = ManifestError;

    fn try_from(raw: RawManifest) -> Result<Self> {
        let schema_version = SchemaVersion::try_from(raw.schema_version)?;
        let library = LibraryName::try_from(raw.library)?;
        let version = SourceVersion::parse(&raw.version)?;
        let entries = raw
            .entries
            .into_iter()
            .map(|entry| {
                ManifestEntry::new(entry.descriptor, entry.path, entry.sha256, entry.size_bytes)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::with_schema(schema_version, library, version, entries)
    }
}

impl From<&PackageManifest> for RawManifest {
    fn from(manifest: &PackageManifest) -> Self {
        Self {
            schema_version: manifest.schema_version().as_u32(),
            library: manifest.library().as_str().to_owned(),
            version: manifest.version().as_str().to_owned(),
            entries: manifest
                .entries()
                .map(|entry| RawEntry {
                    descriptor: entry.descriptor(),
                    path: entry.path().to_owned(),
                    sha256: entry.sha256().clone(),
                    size_bytes: entry.size_bytes(),
                })
                .collect(),
        }
    }
}

/// Parse a JSON string into a validated [`PackageManifest`].
///
/// # Errors
///
/// Returns an error if the JSON is malformed, a field fails validation, the
/// schema version is unsupported, an entry path is unsafe, or a descriptor
/// appears twice.
///
/// # Examples
///
/// ```
/// use archpack::manifest::parse_manifest;
///
/// let json = concat!(
///     r#"{"schema_version":1,"library":"sqlite3","version":"3.45.0","entries":["#,
///     r#"{"architecture":"x64","configuration":"release","#,
///     r#""path":"x64/release/sqlite3.dll","#,
///     r#""sha256":"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa","#,
///     r#""size_bytes":1234}]}"#,
/// );
/// let manifest = parse_manifest(json).expect("valid manifest");
/// assert_eq!(manifest.library().as_str(), "sqlite3");
/// assert_eq!(manifest.entries().count(), 1);
/// ```
pub fn parse_manifest(json: &str) -> Result<PackageManifest> {
    let raw: RawManifest = serde_json::from_str(json)?;
    PackageManifest::try_from(raw)
}

/// Read and parse `path`.
///
/// # Errors
///
/// Returns [`ManifestError::Read`] if the file cannot be read, or any
/// [`parse_manifest`] error.
pub fn load_manifest(path: &Path) -> Result<PackageManifest> {
    let json = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest(&json)
}

/// Render the manifest as pretty-printed JSON with entries in descriptor
/// order.
///
/// # Errors
///
/// Returns [`ManifestError::Json`] if serialization fails.
pub fn to_json(manifest: &PackageManifest) -> Result<String> {
    let mut json = serde_json::to_string_pretty(&RawManifest::from(manifest))?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Architecture;
    use rstest::{fixture, rstest};

    #[fixture]
    fn valid_json() -> String {
        let digest = "a".repeat(64);
        format!(
            concat!(
                r#"{{"schema_version":1,"library":"sqlite3","version":"3.45.0","entries":["#,
                r#"{{"architecture":"x64","configuration":"release","#,
                r#""path":"x64/release/sqlite3.dll","sha256":"{d}","size_bytes":3}},"#,
                r#"{{"architecture":"arm64","configuration":"debug","#,
                r#""path":"arm64/debug/sqlite3.dll","sha256":"{d}","size_bytes":4}}"#,
                r#"]}}"#,
            ),
            d = digest
        )
    }

    #[rstest]
    fn parses_valid_manifest(valid_json: String) {
        let manifest = parse_manifest(&valid_json).expect("valid");
        assert_eq!(manifest.schema_version().as_u32(), 1);
        assert_eq!(manifest.version().as_str(), "3.45.0");
        let entry = manifest
            .entry(ArchitectureDescriptor::debug(Architecture::Arm64))
            .expect("arm64 debug entry");
        assert_eq!(entry.size_bytes(), 4);
        assert_eq!(entry.file_name(), "sqlite3.dll");
    }

    #[rstest]
    fn serialized_form_parses_back_unchanged(valid_json: String) {
        let manifest = parse_manifest(&valid_json).expect("valid");
        let rendered = to_json(&manifest).expect("serialize");
        assert_eq!(parse_manifest(&rendered).expect("reparse"), manifest);
        let x64 = rendered.find("\"x64\"").expect("x64 entry");
        let arm64 = rendered.find("\"arm64\"").expect("arm64 entry");
        assert!(x64 < arm64, "entries are written in descriptor order");
    }

    #[rstest]
    #[case::schema(r#""schema_version":1"#, r#""schema_version":7"#)]
    #[case::library(r#""library":"sqlite3""#, r#""library":"../sqlite""#)]
    #[case::version(r#""version":"3.45.0""#, r#""version":"latest""#)]
    #[case::architecture(r#""architecture":"x64""#, r#""architecture":"mips""#)]
    #[case::traversal("x64/release/sqlite3.dll", "../../sqlite3.dll")]
    #[case::duplicate(r#""architecture":"arm64","configuration":"debug""#, r#""architecture":"x64","configuration":"release""#)]
    fn rejects_invalid_manifests(valid_json: String, #[case] from: &str, #[case] to: &str) {
        let json = valid_json.replacen(from, to, 1);
        assert_ne!(json, valid_json, "case must alter the manifest");
        assert!(parse_manifest(&json).is_err());
    }

    #[rstest]
    fn bad_digest_is_rejected(valid_json: String) {
        let json = valid_json.replacen(&"a".repeat(64), "short", 1);
        assert!(matches!(parse_manifest(&json), Err(ManifestError::Json(_))));
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("manifest.json");
        let err = load_manifest(&path).expect_err("absent");
        assert!(matches!(err, ManifestError::Read { .. }));
    }
}
