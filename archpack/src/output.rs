//! Human-readable summaries printed by the CLI.

use crate::assembler::AssembledPackage;
use crate::manifest::PackageManifest;
use crate::placement::{PlacementOutcome, PlacementResult};

/// Describe a freshly assembled package.
#[must_use]
pub fn package_summary(package: &AssembledPackage) -> String {
    let count = package.manifest.entries().count();
    let plural = if count == 1 { "binary" } else { "binaries" };
    let mut text = format!(
        "Packaged {} {} ({count} {plural}) at {}",
        package.manifest.library(),
        package.manifest.version(),
        package.root.display()
    );
    if let Some(archive) = &package.archive {
        text.push_str(&format!("\nArchive: {}", archive.display()));
    }
    text
}

/// Describe a completed placement.
#[must_use]
pub fn placement_summary(result: &PlacementResult) -> String {
    let verb = match result.outcome {
        PlacementOutcome::Placed => "Placed",
        PlacementOutcome::Unchanged => "Up to date:",
    };
    let mut text = format!("{verb} {} at {}", result.resolved, result.path.display());
    if result.fell_back_to_release {
        text.push_str(&format!(
            " (no {} build; using {})",
            result.requested, result.resolved
        ));
    }
    text
}

/// Render a manifest for `archpack inspect`.
///
/// # Example
///
/// ```
/// use archpack::descriptor::{Architecture, ArchitectureDescriptor};
/// use archpack::digest::Sha256Digest;
/// use archpack::manifest::{LibraryName, ManifestEntry, PackageManifest};
/// use archpack::output::manifest_summary;
/// use archpack::source::SourceVersion;
///
/// let x64 = ArchitectureDescriptor::release(Architecture::X64);
/// let entry = ManifestEntry::new(x64, "x64/release/z.dll", Sha256Digest::of_bytes(b"z"), 1)
///     .expect("valid entry");
/// let manifest = PackageManifest::new(
///     LibraryName::try_from("zlib").expect("valid name"),
///     SourceVersion::parse("1.3.1").expect("valid version"),
///     vec![entry],
/// )
/// .expect("valid manifest");
///
/// let text = manifest_summary(&manifest);
/// assert!(text.starts_with("zlib 1.3.1 (schema 1)"));
/// assert!(text.contains("x64-release"));
/// ```
#[must_use]
pub fn manifest_summary(manifest: &PackageManifest) -> String {
    let mut text = format!(
        "{} {} (schema {})",
        manifest.library(),
        manifest.version(),
        manifest.schema_version().as_u32()
    );
    for entry in manifest.entries() {
        text.push_str(&format!(
            "\n  {:<14} {:<32} {:>10} bytes  sha256 {}",
            entry.descriptor().to_string(),
            entry.path(),
            entry.size_bytes(),
            entry.sha256()
        ));
    }
    text
}
