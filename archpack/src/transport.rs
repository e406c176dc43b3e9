//! `.tar.zst` transport for package directories.
//!
//! A staged package can be archived for upload and later unpacked on the
//! consumer side. Archives are written with deterministic headers, and
//! extraction guards against entries escaping the destination directory.

use crate::manifest::{self, LibraryName, MANIFEST_FILE};
use crate::source::SourceVersion;
use log::debug;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// File extension of transported packages.
pub const ARCHIVE_EXTENSION: &str = "tar.zst";

/// Errors arising from archiving or unpacking a package.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error while reading or writing an archive.
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive holds something other than regular files and
    /// directories.
    #[error("unsupported archive entry {path}: only regular files are allowed")]
    UnsupportedEntry {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive contains no files.
    #[error("archive contains no files")]
    EmptyArchive,

    /// The destination of an archive already exists.
    #[error("refusing to overwrite existing {}", path.display())]
    AlreadyExists {
        /// The existing path.
        path: PathBuf,
    },

    /// The package being archived has an unreadable manifest.
    #[error(transparent)]
    Manifest(#[from] manifest::ManifestError),
}

/// The conventional archive name, e.g. `sqlite3-3.45.0.tar.zst`.
#[must_use]
pub fn archive_file_name(library: &LibraryName, version: &SourceVersion) -> String {
    format!("{library}-{version}.{ARCHIVE_EXTENSION}")
}

/// Whether `path` looks like a transported package rather than a directory.
#[must_use]
pub fn is_archive(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(&format!(".{ARCHIVE_EXTENSION}")))
}

/// Archive the package at `package_root` into `archive_path`.
///
/// Only `manifest.json` and the binaries it lists are included. The archive
/// is written to a temporary file beside `archive_path` and renamed into
/// place once complete.
///
/// # Errors
///
/// Returns [`TransportError::AlreadyExists`] if `archive_path` exists,
/// [`TransportError::Manifest`] if the package manifest cannot be loaded,
/// or [`TransportError::Io`] on I/O failures.
pub fn create_archive(package_root: &Path, archive_path: &Path) -> Result<(), TransportError> {
    if archive_path.exists() {
        return Err(TransportError::AlreadyExists {
            path: archive_path.to_path_buf(),
        });
    }
    let loaded = manifest::load_manifest(&package_root.join(MANIFEST_FILE))?;

    let mut files = vec![(package_root.join(MANIFEST_FILE), MANIFEST_FILE.to_owned())];
    files.extend(
        loaded
            .entries()
            .map(|entry| (entry.resolve_in(package_root), entry.path().to_owned())),
    );

    let parent = archive_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    write_archive(temp.as_file_mut(), &files)?;
    temp.persist_noclobber(archive_path)
        .map_err(|err| TransportError::Io(err.error))?;

    debug!(
        target: "archpack::transport",
        "archived {} files into {}",
        files.len(),
        archive_path.display()
    );
    Ok(())
}

fn write_archive(output: &mut fs::File, files: &[(PathBuf, String)]) -> Result<(), TransportError> {
    let encoder = zstd::Encoder::new(output, 0)?;
    let mut archive = tar::Builder::new(encoder);
    archive.mode(tar::HeaderMode::Deterministic);
    for (source_path, archive_name) in files {
        archive.append_path_with_name(source_path, archive_name)?;
    }
    let encoder = archive.into_inner()?;
    encoder.finish()?.flush()?;
    Ok(())
}

/// Extract the archive at `archive_path` into `dest_dir`.
///
/// Returns the relative paths of the extracted files.
///
/// # Errors
///
/// Returns [`TransportError::PathTraversal`] if any entry attempts to escape
/// the destination, [`TransportError::UnsupportedEntry`] for links and other
/// special entries, [`TransportError::EmptyArchive`] if no files are found,
/// or [`TransportError::Io`] on I/O failures.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, TransportError> {
    let file = fs::File::open(archive_path)?;
    let decoder = zstd::Decoder::new(file)?;
    let mut archive = tar::Archive::new(decoder);
    fs::create_dir_all(dest_dir)?;
    let mut extracted = Vec::new();

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_path = entry.path()?.into_owned();
        validate_entry_path(&entry_path)?;

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(dest_dir.join(&entry_path))?;
            continue;
        }
        if !entry_type.is_file() {
            return Err(TransportError::UnsupportedEntry {
                path: entry_path.display().to_string(),
            });
        }

        let dest_path = dest_dir.join(&entry_path);
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&dest_path)?;
        extracted.push(entry_path);
    }

    if extracted.is_empty() {
        return Err(TransportError::EmptyArchive);
    }
    debug!(
        target: "archpack::transport",
        "extracted {} files into {}",
        extracted.len(),
        dest_dir.display()
    );
    Ok(extracted)
}

/// Validate that a tar entry path does not escape the destination
/// directory via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), TransportError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(TransportError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn write_raw_archive(path: &Path, entries: &[(&str, &[u8])]) {
        let output = fs::File::create(path).expect("create archive");
        let encoder = zstd::Encoder::new(output, 0).expect("zstd encoder");
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            // `set_path` refuses `..`, so write the raw name bytes.
            let name_bytes = name.as_bytes();
            header.as_old_mut().name[..name_bytes.len()].copy_from_slice(name_bytes);
            header.set_cksum();
            builder.append(&header, *data).expect("append");
        }
        let encoder = builder.into_inner().expect("tar finish");
        encoder.finish().expect("zstd finish");
    }

    #[test]
    fn archive_name_joins_library_and_version() {
        let library = LibraryName::try_from("sqlite3").expect("valid");
        let version = SourceVersion::parse("3.45.0").expect("valid");
        let name = archive_file_name(&library, &version);
        assert_eq!(name, "sqlite3-3.45.0.tar.zst");
        assert!(is_archive(Path::new(&name)));
        assert!(!is_archive(Path::new("dist/sqlite3")));
    }

    #[test]
    fn extracts_regular_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let archive = dir.path().join("pkg.tar.zst");
        write_raw_archive(
            &archive,
            &[
                ("manifest.json", b"{}".as_slice()),
                ("x64/release/lib.so", b"elf".as_slice()),
            ],
        );

        let dest = dir.path().join("out");
        let files = extract_archive(&archive, &dest).expect("extract");
        assert_eq!(
            files,
            [PathBuf::from("manifest.json"), PathBuf::from("x64/release/lib.so")]
        );
        assert_eq!(fs::read(dest.join("x64/release/lib.so")).expect("read"), b"elf");
    }

    #[test]
    fn traversal_entries_are_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let archive = dir.path().join("evil.tar.zst");
        write_raw_archive(&archive, &[("../escape.so", b"bad".as_slice())]);

        let err = extract_archive(&archive, &dir.path().join("out")).expect_err("traversal");
        assert!(matches!(err, TransportError::PathTraversal { .. }));
        assert!(!dir.path().join("escape.so").exists());
    }

    #[test]
    fn empty_archive_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let archive = dir.path().join("empty.tar.zst");
        write_raw_archive(&archive, &[]);

        let err = extract_archive(&archive, &dir.path().join("out")).expect_err("empty");
        assert!(matches!(err, TransportError::EmptyArchive));
    }

    #[rstest]
    #[case::parent_dir("../escape.txt")]
    #[case::nested_parent("foo/../../escape.txt")]
    #[case::absolute("/etc/passwd")]
    fn validate_rejects_escaping_paths(#[case] bad_path: &str) {
        assert!(matches!(
            validate_entry_path(Path::new(bad_path)),
            Err(TransportError::PathTraversal { .. })
        ));
    }

    #[test]
    fn create_archive_refuses_to_overwrite() {
        let dir = tempfile::tempdir().expect("temp dir");
        let archive = dir.path().join("pkg.tar.zst");
        fs::write(&archive, b"existing").expect("write");
        let err = create_archive(dir.path(), &archive).expect_err("exists");
        assert!(matches!(err, TransportError::AlreadyExists { .. }));
    }
}
